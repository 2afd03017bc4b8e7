fn main() {
    if let Err(err) = eufy_glue::app::run() {
        eprintln!("eufy glue stopped: {err}");
        std::process::exit(1);
    }
}
