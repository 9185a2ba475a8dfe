mod beacon;
mod host;
mod hourglass;
mod notifier;
mod occupancy;
mod panel;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
