use std::fs;
use std::path::Path;

pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

pub fn write_sidecar(path: &Path, timestamp: &str) {
    write_file(
        path,
        format!(r#"{{"photoTakenTime": {{"timestamp": "{timestamp}"}}}}"#).as_bytes(),
    );
}
