use super::EVENT_SINK;

#[embassy_executor::task]
pub async fn run() -> ! {
    EVENT_SINK.drain().await
}
