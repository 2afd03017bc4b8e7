fn main() {
    if let Err(err) = eufy_glue::app::run() {
        eprintln!("livestream dump failed: {err}");
        std::process::exit(1);
    }
}
