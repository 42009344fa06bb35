#[tokio::main]
async fn main() {
    if let Err(err) = rollcall::run().await {
        eprintln!("rollcall failed: {err:?}");
        std::process::exit(1);
    }
}
