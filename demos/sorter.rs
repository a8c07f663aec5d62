//! Drive a sorting actuator over a serial port, reading one direction per line from stdin.

use simple_logger::SimpleLogger;
use sortlink::{Actuator, LinkOptions};
use std::io::BufRead as _;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable logging
    SimpleLogger::new().init()?;

    let port_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyACM0".to_string());

    // Open the port and wait until the device answers a status probe.
    let actuator = Actuator::serial(LinkOptions::new());
    actuator.connect(&port_path, LinkOptions::DEFAULT_BAUD_RATE)?;

    match actuator.self_test() {
        Ok(result) => println!("self test passed:\n{}", result.text()),
        Err(e) => println!("self test failed: {e}"),
    }

    // Sort in whichever direction is typed, one per line.
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match actuator.move_to(&line) {
            Ok(result) => println!("{result}"),
            Err(e) => println!("{e}"),
        }
    }

    println!("{:#?}", actuator.status());
    actuator.disconnect();
    Ok(())
}
