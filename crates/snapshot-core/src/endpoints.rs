//! Endpoint sourcing.
//!
//! Produces the ordered job list for one run: either the built-in
//! [`DEFAULT_ENDPOINTS`] table or a line-delimited file, optionally shuffled.

use std::fmt;
use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::AppError;

/// Built-in list of OAI-PMH provider base addresses used when no file is given.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "http://export.arxiv.org/oai2",
    "https://zenodo.org/oai2d",
    "https://www.ncbi.nlm.nih.gov/pmc/oai/oai.cgi",
    "https://api.archives-ouvertes.fr/oai/hal",
    "https://oai.datacite.org/oai",
    "https://dspace.mit.edu/oai/request",
    "https://eprints.soton.ac.uk/cgi/oai2",
    "https://eprints.whiterose.ac.uk/cgi/oai2",
    "https://www.repository.cam.ac.uk/oai/request",
    "https://ora.ox.ac.uk/oai2",
    "https://repository.tudelft.nl/oai",
    "https://edoc.hu-berlin.de/oai/request",
    "https://publikationen.bibliothek.kit.edu/oai",
    "https://www.econstor.eu/oai/request",
    "https://www.zora.uzh.ch/cgi/oai2",
];

/// Identifier of a remote metadata provider, usually its base URL.
///
/// Opaque to the worker pool. Duplicates are allowed and processed
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Builds the job list for a run.
///
/// # Examples
///
/// ```
/// use snapshot_core::endpoints::EndpointSource;
///
/// let endpoints = EndpointSource::new(&["https://a.example/oai", "https://b.example/oai"])
///     .load()
///     .unwrap();
/// assert_eq!(endpoints.len(), 2);
/// assert_eq!(endpoints[0].as_str(), "https://a.example/oai");
/// ```
#[derive(Debug, Clone)]
pub struct EndpointSource {
    defaults: &'static [&'static str],
    file: Option<PathBuf>,
    shuffle: bool,
}

impl Default for EndpointSource {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINTS)
    }
}

impl EndpointSource {
    /// Creates a source that falls back to `defaults` when no file is set.
    pub fn new(defaults: &'static [&'static str]) -> Self {
        Self {
            defaults,
            file: None,
            shuffle: false,
        }
    }

    /// Reads endpoints from `path` instead of the defaults.
    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.file = path;
        self
    }

    pub fn shuffled(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Produces the job list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::EndpointList` if the file cannot be read.
    pub fn load(&self) -> Result<Vec<Endpoint>, AppError> {
        let mut endpoints = match &self.file {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| AppError::EndpointList {
                        path: path.display().to_string(),
                        source,
                    })?;
                parse_endpoint_list(&content)
            }
            None => self.defaults.iter().map(|e| Endpoint::from(*e)).collect(),
        };

        tracing::debug!(
            count = endpoints.len(),
            from_file = self.file.is_some(),
            "Loaded endpoint list"
        );

        if self.shuffle {
            shuffle_with(&mut endpoints, &mut rand::rng());
        }

        Ok(endpoints)
    }
}

/// Splits a line-delimited list into endpoints.
///
/// Surrounding whitespace (including `\r`) is trimmed and blank lines are
/// skipped.
pub fn parse_endpoint_list(content: &str) -> Vec<Endpoint> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Endpoint::from)
        .collect()
}

/// Uniform random permutation (Fisher-Yates) using the given generator.
pub fn shuffle_with<R: Rng + ?Sized>(endpoints: &mut [Endpoint], rng: &mut R) {
    endpoints.shuffle(rng);
}
