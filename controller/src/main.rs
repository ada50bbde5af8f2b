mod bank;
mod gpio;
mod host;
mod scheduler;
mod store;
mod surface;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
