#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ask_another::run().await
}
