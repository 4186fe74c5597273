use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use signal_core::{Controller, IntersectionConfig};
use static_cell::StaticCell;

use crate::hw::{EmbassyClock, GpioInputs, GpioOutputs};
use crate::telemetry::{ChannelSink, EventChannel};

mod controller_task;
mod log_task;
mod switch_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type FirmwareController = Controller<
    'static,
    ThreadModeRawMutex,
    GpioOutputs,
    GpioInputs,
    EmbassyClock,
    ChannelSink<'static, ThreadModeRawMutex>,
>;

pub(super) static EVENTS: EventChannel<ThreadModeRawMutex> = Channel::new();
pub(super) static EVENT_SINK: ChannelSink<'static, ThreadModeRawMutex> = ChannelSink::new(&EVENTS);
pub(super) static SHUTDOWN: Signal<ThreadModeRawMutex, ()> = Signal::new();

static CLOCK: EmbassyClock = EmbassyClock;
static INPUTS: StaticCell<GpioInputs> = StaticCell::new();
static CONTROLLER: StaticCell<FirmwareController> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PB0,
        PB1,
        PB2,
        PB3,
        PB4,
        PB5,
        PB6,
        PB7,
        PB8,
        PB9,
        PB10,
        PB11,
        PB12,
        PB13,
        PB14,
        PB15,
        PC0,
        PC1,
        PC2,
        PC3,
        PC4,
        PC5,
        PC6,
        PC7,
        PC8,
        PC9,
        PC10,
        PC11,
        PC12,
        PC13,
        PD0,
        PD1,
        PD2,
        ..
    } = hal::init(config);

    // Every lamp starts dark; the controller takes it from there.
    let outputs = GpioOutputs::new([
        Output::new(PB0, Level::Low, Speed::Low),
        Output::new(PB1, Level::Low, Speed::Low),
        Output::new(PB2, Level::Low, Speed::Low),
        Output::new(PB3, Level::Low, Speed::Low),
        Output::new(PB4, Level::Low, Speed::Low),
        Output::new(PB5, Level::Low, Speed::Low),
        Output::new(PB6, Level::Low, Speed::Low),
        Output::new(PB7, Level::Low, Speed::Low),
        Output::new(PB8, Level::Low, Speed::Low),
        Output::new(PB9, Level::Low, Speed::Low),
        Output::new(PB10, Level::Low, Speed::Low),
        Output::new(PB11, Level::Low, Speed::Low),
        Output::new(PB12, Level::Low, Speed::Low),
        Output::new(PB13, Level::Low, Speed::Low),
        Output::new(PB14, Level::Low, Speed::Low),
        Output::new(PB15, Level::Low, Speed::Low),
        Output::new(PC0, Level::Low, Speed::Low),
        Output::new(PC1, Level::Low, Speed::Low),
        Output::new(PC2, Level::Low, Speed::Low),
        Output::new(PC3, Level::Low, Speed::Low),
        Output::new(PC4, Level::Low, Speed::Low),
    ]);
    let inputs = INPUTS.init(GpioInputs::new([
        Input::new(PC5, Pull::Up),
        Input::new(PC6, Pull::Up),
        Input::new(PC7, Pull::Up),
        Input::new(PC8, Pull::Up),
        Input::new(PC9, Pull::Up),
        Input::new(PC10, Pull::Up),
        Input::new(PC11, Pull::Up),
        Input::new(PC12, Pull::Up),
        Input::new(PD0, Pull::Up),
        Input::new(PD1, Pull::Up),
        Input::new(PD2, Pull::Up),
    ]));
    let maintenance_switch = Input::new(PC13, Pull::Up);

    let controller = match Controller::new(
        IntersectionConfig::default(),
        outputs,
        inputs,
        &CLOCK,
        &EVENT_SINK,
    ) {
        Ok(controller) => CONTROLLER.init(controller),
        Err(error) => {
            defmt::error!("config rejected: {}", defmt::Display2Format(&error));
            return;
        }
    };

    spawner
        .spawn(log_task::run())
        .expect("failed to spawn telemetry log task");

    spawner
        .spawn(switch_task::run(maintenance_switch))
        .expect("failed to spawn maintenance switch task");

    spawner
        .spawn(controller_task::run(controller))
        .expect("failed to spawn controller task");
}
