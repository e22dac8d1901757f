fn main() {
    if let Err(err) = archviz_layout::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
