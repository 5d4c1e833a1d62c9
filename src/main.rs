fn main() {
    if let Err(err) = trade_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
