use signal_core::ShutdownCause;

use super::{FirmwareController, SHUTDOWN};

#[embassy_executor::task]
pub async fn run(controller: &'static FirmwareController) {
    defmt::info!("controller: starting");
    match controller.run(&SHUTDOWN).await {
        ShutdownCause::Requested => defmt::warn!("controller: stopped on request, all red"),
        ShutdownCause::Fault(error) => {
            defmt::error!(
                "controller: stopped on fault ({}), all red",
                defmt::Display2Format(&error)
            );
        }
    }
}
