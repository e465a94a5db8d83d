use ltbs::{PixelFormat, Result, Store};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| "demo.lbf".to_string());

    println!("ltbs-demo - creating a {} tiled bitmap store\n", path);

    let store = Store::create(&path, PixelFormat::Rgba32, 4096, 4096)?;
    store.set_pixel(0, 0, &[255, 0, 0, 255])?;
    store.set_pixel(4095, 4095, &[0, 255, 0, 255])?;

    println!("pixel (0, 0) = {:?}", store.get_pixel(0, 0)?);
    println!("pixel (4095, 4095) = {:?}", store.get_pixel(4095, 4095)?);

    store.close()?;

    println!("\nreopening {} read-only", path);
    let reopened = Store::open(&path, true)?;
    println!("dimensions: {}x{}", reopened.width(), reopened.height());
    println!("pixel (0, 0) = {:?}", reopened.get_pixel(0, 0)?);
    reopened.close()?;

    Ok(())
}
