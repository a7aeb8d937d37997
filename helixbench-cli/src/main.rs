fn main() {
    if let Err(e) = helixbench_cli::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
