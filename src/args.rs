use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use abootimg::{Edits, Replacements, SectionKind};
use console::style;

pub fn fail(message: &str, detail: impl Display) -> ! {
    println!("{}: {}", style(message).red(), detail);
    std::process::exit(-1);
}

pub fn get_image_path(image: &Path) -> PathBuf {
    let current_dir = std::env::current_dir().unwrap_or_else(|e| fail("couldn't get current directory", e));
    let image = current_dir.join(image);
    if image.is_dir() {
        fail("image path is a directory", image.display());
    }
    image
}

pub fn get_existing_image_path(image: &Path) -> PathBuf {
    let image = get_image_path(image);
    std::fs::canonicalize(&image).unwrap_or_else(|_| fail("image path does not exist", image.display()))
}

/// Edits from the config file first, then the `-c` entries in order.
pub fn get_edits(config: Option<&Path>, entries: &[String]) -> Edits {
    let mut edits = Edits::new();
    if let Some(config) = config {
        edits
            .read_file(config)
            .unwrap_or_else(|e| fail(&format!("couldn't read config file {}", config.display()), e));
    }
    for entry in entries {
        edits
            .push_line(entry)
            .unwrap_or_else(|e| fail("invalid config entry", e));
    }
    edits
}

pub fn get_replacements(sources: [Option<&Path>; 4]) -> Replacements {
    let mut replacements = Replacements::new();
    for (kind, path) in SectionKind::ALL.into_iter().zip(sources) {
        if let Some(path) = path {
            replacements
                .load(kind, path)
                .unwrap_or_else(|e| fail(&format!("couldn't read {} {}", kind, path.display()), e));
        }
    }
    replacements
}

pub fn get_output_path(output: Option<&Path>, kind: Option<SectionKind>) -> PathBuf {
    output.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(match kind {
            Some(kind) => kind.default_file_name(),
            None => "bootimg.cfg",
        })
    })
}
