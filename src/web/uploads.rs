use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use axum::extract::Multipart;
use tokio::{fs::File, io::AsyncWriteExt};
use uuid::Uuid;

/// Result type used by the shared upload helpers.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when validating or persisting uploaded files. The message
/// is safe to echo back to the client.
#[derive(Debug)]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UploadError {}

/// How stored filenames are generated for a field.
#[derive(Debug, Clone, Copy)]
pub enum FileNaming {
    /// Prefix the sanitized original name with a random hex token so
    /// concurrent uploads of the same file never collide.
    RandomPrefix,
    /// Prefix with an incrementing index (`input_000_original.pdf`),
    /// preserving submission order in directory listings.
    Indexed { prefix: &'static str, pad_width: usize },
}

impl FileNaming {
    fn build_name(&self, index: usize, sanitized_original: &str) -> String {
        match self {
            FileNaming::RandomPrefix => {
                format!("{}_{}", Uuid::new_v4().simple(), sanitized_original)
            }
            FileNaming::Indexed { prefix, pad_width } => {
                format!(
                    "{prefix}{index:0width$}_{sanitized_original}",
                    width = *pad_width
                )
            }
        }
    }
}

/// Expectations for a single multipart file field.
#[derive(Debug, Clone, Copy)]
pub struct FileFieldConfig {
    pub field_name: &'static str,
    pub allowed_extensions: &'static [&'static str],
    pub max_files: usize,
    pub min_files: usize,
    /// Per-file byte cap, enforced while streaming to disk.
    pub max_file_bytes: u64,
    pub naming: FileNaming,
}

impl FileFieldConfig {
    pub fn new(
        field_name: &'static str,
        allowed_extensions: &'static [&'static str],
        max_files: usize,
        max_file_bytes: u64,
        naming: FileNaming,
    ) -> Self {
        Self {
            field_name,
            allowed_extensions,
            max_files,
            min_files: 1,
            max_file_bytes,
            naming,
        }
    }

    pub fn with_min_files(mut self, min_files: usize) -> Self {
        self.min_files = min_files;
        self
    }
}

/// Metadata describing a stored upload on disk.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub field_name: String,
    pub original_name: String,
    pub stored_name: String,
    pub stored_path: PathBuf,
    pub file_size: u64,
}

/// Aggregated output of the shared upload processor.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub files: Vec<SavedFile>,
    pub text_fields: HashMap<String, Vec<String>>,
}

impl UploadOutcome {
    pub fn files_for<'a>(&'a self, field_name: &str) -> impl Iterator<Item = &'a SavedFile> {
        self.files
            .iter()
            .filter(move |file| file.field_name == field_name)
    }

    pub fn first_file_for(&self, field_name: &str) -> Option<&SavedFile> {
        self.files_for(field_name).next()
    }

    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        self.text_fields
            .get(field_name)
            .and_then(|values| values.first().map(|s| s.as_str()))
    }
}

/// Ensures the destination directory exists.
pub async fn ensure_directory(path: &Path) -> UploadResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|err| UploadError::new(format!("could not create upload directory: {err}")))
}

/// Parses multipart form data, persisting files according to the provided
/// configuration. The caller owns the (unique, per-job) destination
/// directory, including removing it when the request fails later on.
pub async fn process_upload_form(
    mut multipart: Multipart,
    dest_dir: &Path,
    field_configs: &[FileFieldConfig],
) -> UploadResult<UploadOutcome> {
    ensure_directory(dest_dir).await?;

    let mut field_states: HashMap<&str, FieldState> = HashMap::new();
    for config in field_configs {
        if config.max_files == 0 || config.min_files > config.max_files {
            return Err(UploadError::new(format!(
                "invalid upload configuration for field `{}`",
                config.field_name
            )));
        }
        field_states.insert(
            config.field_name,
            FieldState {
                config: *config,
                count: 0,
            },
        );
    }

    let mut text_fields: HashMap<String, Vec<String>> = HashMap::new();
    let mut saved_files: Vec<SavedFile> = Vec::new();
    let mut used_names: HashSet<String> = HashSet::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::new(format!("could not parse the upload form: {err}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        if field.file_name().is_none() {
            let value = field.text().await.map_err(|err| {
                UploadError::new(format!("could not read field `{field_name}`: {err}"))
            })?;
            text_fields.entry(field_name).or_default().push(value);
            continue;
        }

        let Some(state) = field_states.get_mut(field_name.as_str()) else {
            return Err(UploadError::new(format!(
                "unexpected file field `{field_name}`"
            )));
        };

        if state.count >= state.config.max_files {
            return Err(UploadError::new(format!(
                "too many files for `{}` (maximum {})",
                state.config.field_name, state.config.max_files
            )));
        }

        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
        let extension = Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if !state
            .config
            .allowed_extensions
            .iter()
            .any(|allowed| *allowed == extension)
        {
            return Err(UploadError::new(format!(
                "please select a valid {} file",
                state.config.allowed_extensions.join("/")
            )));
        }

        let mut sanitized = sanitize_filename::sanitize(&file_name);
        if sanitized.is_empty() {
            sanitized = format!("file_{}.{}", state.count, extension);
        }

        let stored_name = unique_name(
            state.config.naming.build_name(state.count, &sanitized),
            &mut used_names,
        );
        let stored_path = dest_dir.join(&stored_name);
        let mut file = File::create(&stored_path)
            .await
            .map_err(|err| UploadError::new(format!("could not save the file: {err}")))?;

        let max_bytes = state.config.max_file_bytes;
        let mut total_bytes: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| UploadError::new(format!("could not read the upload: {err}")))?
        {
            total_bytes += chunk.len() as u64;
            if total_bytes > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&stored_path).await;
                return Err(UploadError::new(format!(
                    "file size exceeds the {}MB limit",
                    max_bytes / (1024 * 1024)
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(|err| UploadError::new(format!("could not write the file: {err}")))?;
        }
        file.flush()
            .await
            .map_err(|err| UploadError::new(format!("could not flush the file: {err}")))?;

        if total_bytes == 0 {
            let _ = tokio::fs::remove_file(&stored_path).await;
            return Err(UploadError::new("the uploaded file is empty"));
        }

        saved_files.push(SavedFile {
            field_name: state.config.field_name.to_string(),
            original_name: file_name,
            stored_name,
            stored_path,
            file_size: total_bytes,
        });

        state.count += 1;
    }

    for state in field_states.values() {
        if state.count < state.config.min_files {
            return Err(UploadError::new(format!(
                "please upload at least {} file(s) for `{}`",
                state.config.min_files, state.config.field_name
            )));
        }
    }

    Ok(UploadOutcome {
        files: saved_files,
        text_fields,
    })
}

#[derive(Clone, Copy, Debug)]
struct FieldState {
    config: FileFieldConfig,
    count: usize,
}

fn unique_name(candidate: String, used: &mut HashSet<String>) -> String {
    if used.insert(candidate.clone()) {
        return candidate;
    }

    let (stem, extension) = split_name(&candidate);
    let mut counter = 1usize;
    loop {
        let attempt = if extension.is_empty() {
            format!("{stem}_{counter}")
        } else {
            format!("{stem}_{counter}.{extension}")
        };
        if used.insert(attempt.clone()) {
            return attempt;
        }
        counter += 1;
    }
}

fn split_name(name: &str) -> (String, String) {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string();
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();
    (stem, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_prefix_keeps_original_name() {
        let name = FileNaming::RandomPrefix.build_name(0, "report.pdf");
        assert!(name.ends_with("_report.pdf"));
        assert!(name.len() > "report.pdf".len() + 1);
    }

    #[test]
    fn random_prefix_is_collision_resistant() {
        let a = FileNaming::RandomPrefix.build_name(0, "report.pdf");
        let b = FileNaming::RandomPrefix.build_name(0, "report.pdf");
        assert_ne!(a, b);
    }

    #[test]
    fn indexed_naming_pads_ordinal() {
        let naming = FileNaming::Indexed {
            prefix: "input_",
            pad_width: 3,
        };
        assert_eq!(naming.build_name(5, "doc.pdf"), "input_005_doc.pdf");
    }

    #[test]
    fn unique_name_appends_counter() {
        let mut used = HashSet::new();
        let first = unique_name("file.pdf".to_string(), &mut used);
        let second = unique_name("file.pdf".to_string(), &mut used);
        assert_eq!(first, "file.pdf");
        assert_eq!(second, "file_1.pdf");
    }

    #[test]
    fn split_name_handles_dotted_stems() {
        let (stem, ext) = split_name("report.final.pdf");
        assert_eq!(stem, "report.final");
        assert_eq!(ext, "pdf");
    }
}
