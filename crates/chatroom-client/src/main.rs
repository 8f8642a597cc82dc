#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatroom_client_lib::run().await
}
