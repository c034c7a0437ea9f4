//! Command dispatch
//!
//! Maps one decoded request onto the device model and builds the response.
//! Every peer-facing failure is folded into the response `result`; nothing
//! here can fail the exchange itself.

use regmodel_protocol::{Command, ProtocolMessage, ResultCode};
use regmodel_sim::DeviceModel;
use tracing::{debug, warn};

/// Execute `request` against `device` and build the response
pub fn dispatch(device: &mut dyn DeviceModel, request: &ProtocolMessage) -> ProtocolMessage {
    debug!(
        "Dispatch: device_id={} cmd={} addr=0x{:08X} len={}",
        request.device_id, request.command, request.address, request.length
    );

    match request.command {
        Command::Read => match device.read(request.address) {
            Ok(value) => ProtocolMessage::response_to(request, ResultCode::Success).with_value(value),
            Err(e) => {
                debug!("Read failed: {}", e);
                ProtocolMessage::response_to(request, e.result_code())
            }
        },
        Command::Write => match device.write(request.address, request.value()) {
            Ok(()) => ProtocolMessage::response_to(request, ResultCode::Success),
            Err(e) => {
                debug!("Write failed: {}", e);
                ProtocolMessage::response_to(request, e.result_code())
            }
        },
        Command::Init => {
            device.init(request.device_id);
            ProtocolMessage::response_to(request, ResultCode::Success)
        }
        Command::Deinit => {
            device.deinit(request.device_id);
            ProtocolMessage::response_to(request, ResultCode::Success)
        }
        // Interrupts only flow from the model to the driver
        Command::Interrupt | Command::Unknown(_) => {
            warn!("Unknown command: {}", request.command);
            ProtocolMessage::response_to(request, ResultCode::Error)
        }
    }
}
