use std::path::{Path, PathBuf};
use std::time::Duration;

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Image file name endings picked up by the bulk rename
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "tif", "tiff", "bmp"];

/// Check whether a file name looks like a supported image
pub fn is_image_file(path: &Path) -> bool {
    file_extension(path)
        .map(|ext| ext.to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Get file extension exactly as written
pub fn file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// First name from `stem.ext`, `stem-1.ext`, `stem-2.ext`, ... for which `taken` is false
pub fn unique_file_name<F>(stem: &str, extension: Option<&str>, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let name_for = |suffix: Option<u32>| {
        let stem = match suffix {
            Some(counter) => format!("{stem}-{counter}"),
            None => stem.to_string(),
        };
        match extension {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        }
    };

    let mut name = name_for(None);
    let mut counter = 1;
    while taken(&name) {
        name = name_for(Some(counter));
        counter += 1;
    }
    name
}

/// Create a new folder `parent/name`, or `parent/name-N` if that exists
pub fn create_unique_folder(parent: &Path, name: &str) -> std::io::Result<PathBuf> {
    let folder = parent.join(unique_file_name(name, None, |candidate| {
        parent.join(candidate).exists()
    }));
    std::fs::create_dir_all(&folder)?;
    Ok(folder)
}

/// Make a decoded barcode value usable as a file name
///
/// Path separators and characters rejected by common file systems become `_`,
/// so the result always names a file directly inside the target folder.
pub fn sanitize_file_name(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.trim() {
        "" => "_".to_string(),
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("/a/IMG_001.JPG")));
        assert!(is_image_file(Path::new("scan.tiff")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("/")));
    }

    #[test]
    fn test_unique_file_name_counts_up() {
        let existing = ["A.png", "A-1.png"];
        let name = unique_file_name("A", Some("png"), |n| existing.contains(&n));
        assert_eq!(name, "A-2.png");
        assert_eq!(unique_file_name("B", Some("png"), |n| existing.contains(&n)), "B.png");
    }

    #[test]
    fn test_create_unique_folder() {
        let dir = tempfile::tempdir().unwrap();
        let first = create_unique_folder(dir.path(), "renamed").unwrap();
        let second = create_unique_folder(dir.path(), "renamed").unwrap();
        assert_eq!(first, dir.path().join("renamed"));
        assert_eq!(second, dir.path().join("renamed-1"));
        assert!(second.is_dir());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("ABC-123"), "ABC-123");
        assert_eq!(sanitize_file_name("https://x.org/p?id=1"), "https___x.org_p_id=1");
        assert_eq!(sanitize_file_name(".."), "__");
        assert_eq!(sanitize_file_name("  "), "_");
    }
}
