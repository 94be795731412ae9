use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LoadError;

/// On-disk layout of an embedding artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ModelFormat {
    /// Pick the format from the extension and contents
    #[default]
    Auto,
    /// word2vec text: `<count> <dim>` header, then `key v1 .. vdim` per line
    #[value(name = "text")]
    Word2VecText,
    /// word2vec binary: text header, then `key ` followed by little-endian f32s
    #[value(name = "binary")]
    Word2VecBinary,
    /// `{"vector_size", "index_to_key", "vectors"}`
    Json,
}

/// Anything that can hand out a vector for a node identifier.
pub trait VectorLookup {
    fn vector(&self, key: &str) -> Option<&[f32]>;
}

impl VectorLookup for HashMap<String, Vec<f32>> {
    fn vector(&self, key: &str) -> Option<&[f32]> {
        self.get(key).map(Vec::as_slice)
    }
}

/// Keyed node vectors with a stable key order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingModel {
    vector_size: usize,
    index_to_key: Vec<String>,
    key_to_index: HashMap<String, usize>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonModel {
    vector_size: usize,
    index_to_key: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingModel {
    /// Build a model from `(key, vector)` pairs, keeping their order.
    pub fn from_entries<I, K>(vector_size: usize, entries: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (K, Vec<f32>)>,
        K: Into<String>,
    {
        let mut index_to_key = Vec::new();
        let mut key_to_index = HashMap::new();
        let mut vectors = Vec::new();

        for (key, vector) in entries {
            let key = key.into();
            if vector.len() != vector_size {
                return Err(LoadError::Dimension {
                    key,
                    expected: vector_size,
                    found: vector.len(),
                });
            }
            if key_to_index.contains_key(&key) {
                return Err(LoadError::DuplicateKey(key));
            }
            key_to_index.insert(key.clone(), index_to_key.len());
            index_to_key.push(key);
            vectors.push(vector);
        }

        Ok(Self {
            vector_size,
            index_to_key,
            key_to_index,
            vectors,
        })
    }

    /// Load a model, detecting its format.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        Self::load_with_format(path, ModelFormat::Auto)
    }

    pub fn load_with_format<P: AsRef<Path>>(
        path: P,
        format: ModelFormat,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let format = match format {
            ModelFormat::Auto => detect_format(path, &bytes),
            explicit => explicit,
        };
        debug!(path = %path.display(), ?format, bytes = bytes.len(), "parsing embedding model");

        let model = match format {
            ModelFormat::Word2VecText => {
                let text = std::str::from_utf8(&bytes).map_err(|e| LoadError::Header {
                    path: path.to_path_buf(),
                    reason: format!("not valid UTF-8 text: {}", e),
                })?;
                parse_text(path, text)?
            }
            ModelFormat::Word2VecBinary => parse_binary(path, &bytes)?,
            ModelFormat::Json => parse_json(path, &bytes)?,
            // Text and binary share a header; text that fails to parse may still be binary.
            ModelFormat::Auto => match std::str::from_utf8(&bytes) {
                Ok(text) => match parse_text(path, text) {
                    Ok(model) => model,
                    Err(text_err) => parse_binary(path, &bytes).map_err(|_| text_err)?,
                },
                Err(_) => parse_binary(path, &bytes)?,
            },
        };

        if model.is_empty() {
            return Err(LoadError::Empty(path.to_path_buf()));
        }

        info!(
            path = %path.display(),
            nodes = model.len(),
            vector_size = model.vector_size,
            "loaded embedding model"
        );
        Ok(model)
    }

    /// Identifiers in stored order.
    pub fn index_to_key(&self) -> &[String] {
        &self.index_to_key
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    pub fn len(&self) -> usize {
        self.index_to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_key.is_empty()
    }

    /// First `n` identifiers, for a quick look at what was loaded.
    pub fn preview(&self, n: usize) -> &[String] {
        &self.index_to_key[..n.min(self.len())]
    }

    /// Save as JSON, readable by [`EmbeddingModel::load`].
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&JsonModel {
            vector_size: self.vector_size,
            index_to_key: self.index_to_key.clone(),
            vectors: self.vectors.clone(),
        })?;
        fs::write(path, json)
    }

    /// Write in word2vec text or binary layout.
    pub fn write_word2vec<W: Write>(&self, mut writer: W, binary: bool) -> std::io::Result<()> {
        writeln!(writer, "{} {}", self.len(), self.vector_size)?;
        for (key, vector) in self.index_to_key.iter().zip(&self.vectors) {
            if binary {
                writer.write_all(key.as_bytes())?;
                writer.write_all(b" ")?;
                for value in vector {
                    writer.write_all(&value.to_le_bytes())?;
                }
                writer.write_all(b"\n")?;
            } else {
                let values: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
                writeln!(writer, "{} {}", key, values.join(" "))?;
            }
        }
        writer.flush()
    }
}

impl VectorLookup for EmbeddingModel {
    fn vector(&self, key: &str) -> Option<&[f32]> {
        self.key_to_index
            .get(key)
            .map(|&index| self.vectors[index].as_slice())
    }
}

fn detect_format(path: &Path, bytes: &[u8]) -> ModelFormat {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => return ModelFormat::Json,
        Some("bin") => return ModelFormat::Word2VecBinary,
        Some("txt") | Some("vec") => return ModelFormat::Word2VecText,
        _ => {}
    }

    if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        ModelFormat::Json
    } else {
        ModelFormat::Auto
    }
}

fn parse_header(path: &Path, header: &str) -> Result<(usize, usize), LoadError> {
    let header_error = |reason: String| LoadError::Header {
        path: path.to_path_buf(),
        reason,
    };

    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(header_error(format!(
            "expected '<count> <dimensions>', got '{}'",
            header.trim()
        )));
    }

    let count = fields[0]
        .parse::<usize>()
        .map_err(|e| header_error(format!("bad vector count '{}': {}", fields[0], e)))?;
    let dim = fields[1]
        .parse::<usize>()
        .map_err(|e| header_error(format!("bad dimension '{}': {}", fields[1], e)))?;

    if dim == 0 {
        return Err(header_error("vector dimension must be positive".to_string()));
    }
    Ok((count, dim))
}

fn parse_text(path: &Path, text: &str) -> Result<EmbeddingModel, LoadError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| LoadError::Empty(path.to_path_buf()))?;
    let (count, dim) = parse_header(path, header)?;

    // The header count is only checked once every line has been read.
    let mut entries = Vec::new();
    for (line_index, line) in lines {
        let record_error = |reason: String| LoadError::Record {
            path: path.to_path_buf(),
            record: line_index + 1,
            reason,
        };

        let mut fields = line.split_whitespace();
        let key = fields
            .next()
            .ok_or_else(|| record_error("missing key".to_string()))?;
        let values = fields
            .map(|field| match field.parse::<f32>() {
                Ok(value) if value.is_finite() => Ok(value),
                Ok(value) => Err(record_error(format!("non-finite value {} for '{}'", value, key))),
                Err(e) => Err(record_error(format!("bad value '{}': {}", field, e))),
            })
            .collect::<Result<Vec<f32>, LoadError>>()?;

        if values.len() != dim {
            return Err(LoadError::Dimension {
                key: key.to_string(),
                expected: dim,
                found: values.len(),
            });
        }
        entries.push((key.to_string(), values));
    }

    if entries.len() != count {
        return Err(LoadError::CountMismatch {
            path: path.to_path_buf(),
            expected: count,
            found: entries.len(),
        });
    }

    EmbeddingModel::from_entries(dim, entries)
}

fn parse_binary(path: &Path, bytes: &[u8]) -> Result<EmbeddingModel, LoadError> {
    let header_end = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| LoadError::Header {
            path: path.to_path_buf(),
            reason: "missing header line".to_string(),
        })?;
    let header = std::str::from_utf8(&bytes[..header_end]).map_err(|e| LoadError::Header {
        path: path.to_path_buf(),
        reason: format!("header is not UTF-8: {}", e),
    })?;
    let (count, dim) = parse_header(path, header)?;

    let vector_bytes = dim
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(|| LoadError::Header {
            path: path.to_path_buf(),
            reason: format!("dimension {} is too large", dim),
        })?;
    let mut pos = header_end + 1;
    let mut entries = Vec::new();

    for record in 1..=count {
        let record_error = |reason: &str| LoadError::Record {
            path: path.to_path_buf(),
            record,
            reason: reason.to_string(),
        };

        // Writers differ on whether a newline follows each vector.
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            return Err(LoadError::CountMismatch {
                path: path.to_path_buf(),
                expected: count,
                found: record - 1,
            });
        }

        let key_end = bytes[pos..]
            .iter()
            .position(|&b| b == b' ')
            .map(|offset| pos + offset)
            .ok_or_else(|| record_error("missing space after key"))?;
        let key = std::str::from_utf8(&bytes[pos..key_end])
            .map_err(|_| record_error("key is not UTF-8"))?
            .to_string();
        pos = key_end + 1;

        let vector_end = match pos.checked_add(vector_bytes) {
            Some(end) if end <= bytes.len() => end,
            _ => return Err(record_error("truncated vector")),
        };
        let vector: Vec<f32> = bytes[pos..vector_end]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(record_error("non-finite value in vector"));
        }
        pos = vector_end;

        entries.push((key, vector));
    }

    if bytes[pos.min(bytes.len())..]
        .iter()
        .any(|b| !b.is_ascii_whitespace())
    {
        return Err(LoadError::Record {
            path: path.to_path_buf(),
            record: count + 1,
            reason: format!("trailing data after {} declared vectors", count),
        });
    }

    EmbeddingModel::from_entries(dim, entries)
}

fn parse_json(path: &Path, bytes: &[u8]) -> Result<EmbeddingModel, LoadError> {
    let raw: JsonModel = serde_json::from_slice(bytes).map_err(|source| LoadError::Json {
        path: PathBuf::from(path),
        source,
    })?;

    if let Some(record) = raw
        .vectors
        .iter()
        .position(|vector| vector.iter().any(|v| !v.is_finite()))
    {
        return Err(LoadError::Record {
            path: path.to_path_buf(),
            record: record + 1,
            reason: "non-finite value in vector".to_string(),
        });
    }

    if raw.index_to_key.len() != raw.vectors.len() {
        return Err(LoadError::CountMismatch {
            path: path.to_path_buf(),
            expected: raw.index_to_key.len(),
            found: raw.vectors.len(),
        });
    }

    EmbeddingModel::from_entries(raw.vector_size, raw.index_to_key.into_iter().zip(raw.vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn toy_model() -> EmbeddingModel {
        EmbeddingModel::from_entries(
            3,
            vec![
                ("CID1", vec![0.5, -1.0, 2.0]),
                ("PROT1", vec![1.5, 0.25, -3.0]),
            ],
        )
        .unwrap()
    }

    fn write_temp(suffix: &str, contents: &[u8]) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_word2vec_text_keeps_order() {
        let file = write_temp(
            ".txt",
            b"3 2\nPROT9 1.0 2.0\nCID7 -0.5 0.5\nCID1 3 4\n",
        );
        let model = EmbeddingModel::load(file.path()).unwrap();

        assert_eq!(model.index_to_key(), &["PROT9", "CID7", "CID1"]);
        assert_eq!(model.vector_size(), 2);
        assert_eq!(model.vector("CID7"), Some(&[-0.5f32, 0.5][..]));
        assert_eq!(model.vector("missing"), None);
    }

    #[test]
    fn test_binary_layout_is_detected_without_extension() {
        let model = toy_model();
        let mut bytes = Vec::new();
        model.write_word2vec(&mut bytes, true).unwrap();
        let file = write_temp(".model", &bytes);

        let loaded = EmbeddingModel::load(file.path()).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_binary_without_trailing_newlines() {
        let mut bytes = b"2 1\n".to_vec();
        bytes.extend_from_slice(b"a ");
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(b"b ");
        bytes.extend_from_slice(&(-2.0f32).to_le_bytes());
        let file = write_temp(".bin", &bytes);

        let loaded = EmbeddingModel::load(file.path()).unwrap();
        assert_eq!(loaded.index_to_key(), &["a", "b"]);
        assert_eq!(loaded.vector("b"), Some(&[-2.0f32][..]));
    }

    #[test]
    fn test_json_model_loads() {
        let model = toy_model();
        let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        model.save_json(file.path()).unwrap();

        let loaded = EmbeddingModel::load(file.path()).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EmbeddingModel::load("/definitely/not/here/node2vec_full.model").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_empty_model_fails_fast() {
        let file = write_temp(".txt", b"0 64\n");
        let err = EmbeddingModel::load(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Empty(_)));

        let blank = write_temp(".txt", b"");
        assert!(matches!(
            EmbeddingModel::load(blank.path()).unwrap_err(),
            LoadError::Empty(_)
        ));
    }

    #[test]
    fn test_ragged_vectors_are_rejected() {
        let file = write_temp(".txt", b"2 3\nCID1 1 2 3\nPROT1 1 2\n");
        let err = EmbeddingModel::load(file.path()).unwrap_err();
        match err {
            LoadError::Dimension {
                key,
                expected,
                found,
            } => {
                assert_eq!(key, "PROT1");
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_count_mismatch_and_bad_header() {
        let short = write_temp(".txt", b"3 1\nCID1 1\nCID2 2\n");
        assert!(matches!(
            EmbeddingModel::load(short.path()).unwrap_err(),
            LoadError::CountMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));

        let bad = write_temp(".txt", b"not a header\n");
        assert!(matches!(
            EmbeddingModel::load(bad.path()).unwrap_err(),
            LoadError::Header { .. }
        ));
    }

    #[test]
    fn test_oversized_count_is_a_load_error() {
        let text = write_temp(".txt", b"100000000000000000 2\nCID1 1 2\n");
        assert!(matches!(
            EmbeddingModel::load(text.path()).unwrap_err(),
            LoadError::CountMismatch {
                expected: 100000000000000000,
                found: 1,
                ..
            }
        ));

        let mut bytes = b"100000000000000000 1\nCID1 ".to_vec();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        let binary = write_temp(".bin", &bytes);
        assert!(matches!(
            EmbeddingModel::load(binary.path()).unwrap_err(),
            LoadError::CountMismatch { found: 1, .. }
        ));
    }

    #[test]
    fn test_oversized_binary_dimension_is_a_load_error() {
        let header = format!("1 {}\nCID1 \0\0\0\0", usize::MAX / 2);
        let file = write_temp(".bin", header.as_bytes());
        assert!(matches!(
            EmbeddingModel::load(file.path()).unwrap_err(),
            LoadError::Header { .. }
        ));

        // Fits in usize once multiplied, but not once added to the read offset.
        let header = format!("1 {}\nCID1 \0\0\0\0", usize::MAX / 4);
        let file = write_temp(".bin", header.as_bytes());
        assert!(matches!(
            EmbeddingModel::load(file.path()).unwrap_err(),
            LoadError::Record { record: 1, .. }
        ));
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        for contents in [&b"1 2\nCID1 1 NaN\n"[..], &b"1 2\nCID1 inf 1\n"[..]] {
            let file = write_temp(".txt", contents);
            assert!(matches!(
                EmbeddingModel::load(file.path()).unwrap_err(),
                LoadError::Record { record: 2, .. }
            ));
        }

        let mut bytes = b"1 1\nCID1 ".to_vec();
        bytes.extend_from_slice(&f32::NAN.to_le_bytes());
        let binary = write_temp(".bin", &bytes);
        assert!(matches!(
            EmbeddingModel::load(binary.path()).unwrap_err(),
            LoadError::Record { record: 1, .. }
        ));

        let json = write_temp(
            ".json",
            br#"{"vector_size": 1, "index_to_key": ["CID1"], "vectors": [[1e39]]}"#,
        );
        assert!(matches!(
            EmbeddingModel::load(json.path()).unwrap_err(),
            LoadError::Record { record: 1, .. }
        ));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = EmbeddingModel::from_entries(1, vec![("CID1", vec![1.0]), ("CID1", vec![2.0])])
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateKey(key) if key == "CID1"));
    }

    #[test]
    fn test_preview_is_clamped() {
        let model = toy_model();
        assert_eq!(model.preview(10).len(), 2);
        assert_eq!(model.preview(1), &["CID1"]);
    }
}
