#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskpilot_lib::run().await
}
