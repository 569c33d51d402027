#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pacekeeper_lib::run().await
}
