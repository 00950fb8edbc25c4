#[tokio::main]
async fn main() {
    if let Err(err) = smartslide_lib::run().await {
        log::error!("fatal: {err:#}");
        eprintln!("smartslide: {err:#}");
        std::process::exit(1);
    }
}
