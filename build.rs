fn main() {
    // Feeds `built_info`, which the health endpoint and `--version` report.
    built::write_built_file().expect("Failed to write build information");
}
