//! Figure image persistence
//!
//! Writes the first image asset of a page under the public image
//! directory and returns the public-facing path recorded on the task
//! record. Filenames are the sanitized figure reference decorated with
//! page and image indices to avoid collisions.

use crate::pdf::PageUnit;
use regex_lite::Regex;
use std::fs;
use std::path::PathBuf;
use tacforge_common::config::ImagesConfig;
use tracing::{debug, info, warn};

pub struct ImageStore {
    output_dir: PathBuf,
    public_prefix: String,
}

impl ImageStore {
    pub fn new(config: &ImagesConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output_dir),
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Persist the first image asset on the page for the given figure
    /// reference. Returns the public-facing path, or None when the page
    /// has no images or the write fails; absence is not an error.
    pub fn save_first(&self, page: &PageUnit, figure_ref: &str) -> Option<String> {
        if page.images.is_empty() {
            debug!(
                page = page.number,
                figure_ref, "No image assets on page for figure reference"
            );
            return None;
        }

        if let Err(e) = fs::create_dir_all(&self.output_dir) {
            warn!(dir = %self.output_dir.display(), error = %e, "Cannot create image output directory");
            return None;
        }

        let sane_ref = sanitize_figure_ref(figure_ref);
        for (index, image) in page.images.iter().enumerate() {
            let filename = format!("{}_pdfpage{}_{}.{}", sane_ref, page.number, index, image.ext);
            let local_path = self.output_dir.join(&filename);

            match fs::write(&local_path, &image.data) {
                Ok(()) => {
                    info!(
                        path = %local_path.display(),
                        figure_ref,
                        page = page.number,
                        "Saved figure image"
                    );
                    return Some(format!("{}/{}", self.public_prefix, filename));
                }
                Err(e) => {
                    warn!(path = %local_path.display(), error = %e, "Failed to write image, trying next asset");
                }
            }
        }

        None
    }
}

/// Sanitize a figure reference for use in a filename: spaces become
/// underscores, any other non-alphanumeric characters are removed, and
/// the result is lower-cased.
pub fn sanitize_figure_ref(figure_ref: &str) -> String {
    let pattern = Regex::new(r"[^a-zA-Z0-9_-]").expect("valid sanitization pattern");
    pattern
        .replace_all(&figure_ref.replace(' ', "_"), "")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_figure_ref() {
        assert_eq!(sanitize_figure_ref("Figure B-23"), "figure_b-23");
        assert_eq!(sanitize_figure_ref("Figure 8.1 (a)"), "figure_81_a");
        assert_eq!(sanitize_figure_ref("B-2"), "b-2");
    }

    #[test]
    fn test_save_first_with_no_images() {
        let store = ImageStore::new(&ImagesConfig {
            output_dir: "target/test-task-images".to_string(),
            public_prefix: "public/task_images".to_string(),
        });
        let page = PageUnit {
            number: 411,
            text: String::new(),
            images: vec![],
        };

        assert!(store.save_first(&page, "Figure B-1").is_none());
    }

    #[test]
    fn test_save_first_returns_public_path() {
        let store = ImageStore::new(&ImagesConfig {
            output_dir: "target/test-task-images".to_string(),
            public_prefix: "public/task_images/".to_string(),
        });
        let page = PageUnit {
            number: 411,
            text: String::new(),
            images: vec![crate::pdf::PageImage {
                data: vec![0xFF, 0xD8, 0xFF],
                ext: "jpg",
            }],
        };

        let path = store.save_first(&page, "Figure B-1").unwrap();
        assert_eq!(path, "public/task_images/figure_b-1_pdfpage411_0.jpg");
        assert!(PathBuf::from("target/test-task-images/figure_b-1_pdfpage411_0.jpg").exists());
    }
}
