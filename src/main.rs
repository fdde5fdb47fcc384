#[tokio::main]
async fn main() {
    autosave::start().await;
}
