//! Runs a device and a host client in one process over an in-memory link.
//!
//! Run with:
//!   cargo run -p softu2f --example loopback-device
//!
//! The device answers MSG by reversing the APDU bytes, which is enough to see
//! a request travel through fragmentation and reassembly in both directions.

use std::time::Duration;

use softu2f::device::{Device, DeviceConfig, DeviceContext, HostClient};
use softu2f::frame::{Message, U2FHID_MSG};
use softu2f::transport::MemoryTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (device_end, host_end) = MemoryTransport::pair();

    let config = DeviceConfig {
        input_wait_ms: 20,
        frame_pacing_ms: 0,
        ..DeviceConfig::default()
    };
    let mut device = Device::open(device_end, config)?;
    device.register_handler(
        U2FHID_MSG,
        |ctx: &mut DeviceContext, message: &Message| -> softu2f::device::Result<()> {
            let mut reply = message.payload.to_vec();
            reply.reverse();
            ctx.send_message(&Message::new(message.cid, U2FHID_MSG, reply))
        },
    )?;
    let shutdown = device.shutdown_handle();
    let worker = std::thread::spawn(move || device.run());

    let mut client = HostClient::new(host_end).with_timeout(Duration::from_secs(2));
    let init = client.init()?;
    eprintln!(
        "channel {:08x}, interface v{}, wink: {}",
        init.cid,
        init.interface_version,
        init.supports_wink()
    );

    let echoed = client.ping(vec![0x5a; 200])?;
    eprintln!("PING echoed {} bytes", echoed.len());

    let response = client.msg(&b"\x00\x03\x00\x00"[..])?;
    eprintln!("MSG response: {:02x?}", response.as_ref());

    shutdown.request();
    worker
        .join()
        .map_err(|_| "device thread panicked")??;
    Ok(())
}
