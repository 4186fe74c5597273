use embassy_stm32::gpio::Input;
use embassy_time::{Duration, Timer};

use super::SHUTDOWN;

const SWITCH_POLL: Duration = Duration::from_millis(50);

/// Requests the fail-safe once the maintenance switch (active low) closes.
#[embassy_executor::task]
pub async fn run(switch: Input<'static>) {
    while switch.is_high() {
        Timer::after(SWITCH_POLL).await;
    }
    defmt::warn!("maintenance switch closed: requesting shutdown");
    SHUTDOWN.signal(());
}
