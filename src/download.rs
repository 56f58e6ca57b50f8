//! One-time bulk download of the DigiFace-1M archives.
//!
//! Each archive is fetched, written to a temporary path inside the target
//! directory, extracted in place and then removed. A JSON completion marker
//! is written per archive so rerunning after a failure resumes from the
//! first unfinished archive.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, DatasetResult};

/// The 8 DigiFace-1M archives.
///
/// The first five hold 10K identities at 72 images each (pose variety),
/// the last three 100K identities at 5 images each (identity variety).
pub const ARCHIVE_URLS: [&str; 8] = [
    "https://facesyntheticspubwedata.blob.core.windows.net/wacv-2023/subjects_0-1999_72_imgs.zip",
    "https://facesyntheticspubwedata.blob.core.windows.net/wacv-2023/subjects_2000-3999_72_imgs.zip",
    "https://facesyntheticspubwedata.blob.core.windows.net/wacv-2023/subjects_4000-5999_72_imgs.zip",
    "https://facesyntheticspubwedata.blob.core.windows.net/wacv-2023/subjects_6000-7999_72_imgs.zip",
    "https://facesyntheticspubwedata.blob.core.windows.net/wacv-2023/subjects_8000-9999_72_imgs.zip",
    "https://facesyntheticspubwedata.blob.core.windows.net/wacv-2023/subjects_100000-133332_5_imgs.zip",
    "https://facesyntheticspubwedata.blob.core.windows.net/wacv-2023/subjects_133333-166665_5_imgs.zip",
    "https://facesyntheticspubwedata.blob.core.windows.net/wacv-2023/subjects_166666-199998_5_imgs.zip",
];

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Source of archive bytes, swappable in tests.
pub trait ArchiveFetcher {
    fn fetch(&self, url: &str) -> DatasetResult<Vec<u8>>;
}

/// Blocking HTTP fetcher with bounded retry and exponential backoff.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build http client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> DatasetResult<Vec<u8>> {
        let mut delay = RETRY_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .client
                .get(url)
                .send()
                .and_then(|response| response.error_for_status())
                .and_then(|response| response.bytes());
            match result {
                Ok(bytes) => return Ok(bytes.to_vec()),
                Err(source) if attempt < MAX_ATTEMPTS => {
                    log::warn!("fetch attempt {attempt} for {url} failed: {source}");
                    thread::sleep(delay);
                    delay *= 2;
                }
                Err(source) => {
                    return Err(DatasetError::Network {
                        url: url.to_owned(),
                        source: Box::new(source),
                    })
                }
            }
        }
        unreachable!("loop returns on every attempt")
    }
}

/// Written into the target directory once an archive is fully unpacked.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionMarker {
    pub url: String,
    pub entries: usize,
}

/// Sequential fetch-and-extract runner over the fixed archive list.
pub struct BulkDownload<F: ArchiveFetcher> {
    fetcher: F,
    urls: Vec<String>,
}

impl BulkDownload<HttpFetcher> {
    pub fn new() -> Self {
        Self::with_fetcher(HttpFetcher::new())
    }
}

impl Default for BulkDownload<HttpFetcher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ArchiveFetcher> BulkDownload<F> {
    pub fn with_fetcher(fetcher: F) -> Self {
        Self {
            fetcher,
            urls: ARCHIVE_URLS.iter().map(|url| (*url).to_owned()).collect(),
        }
    }

    /// Fetch and unpack every archive into `root`, skipping archives whose
    /// completion marker already exists.
    ///
    /// A failure aborts the run; already-extracted archives keep their
    /// markers, so the next run picks up where this one stopped.
    pub fn run<P: AsRef<Path>>(&self, root: P) -> DatasetResult<()> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|source| DatasetError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        for url in &self.urls {
            self.fetch_and_extract(root, url)?;
        }
        Ok(())
    }

    fn fetch_and_extract(&self, root: &Path, url: &str) -> DatasetResult<()> {
        let marker = marker_path(root, url);
        if marker.exists() {
            log::info!("{} already extracted, skipping", archive_name(url));
            return Ok(());
        }

        log::info!("downloading {url}");
        let bytes = self.fetcher.fetch(url)?;

        let archive_path = root.join(archive_name(url));
        fs::write(&archive_path, &bytes).map_err(|source| DatasetError::Io {
            path: archive_path.clone(),
            source,
        })?;

        let file = File::open(&archive_path).map_err(|source| DatasetError::Io {
            path: archive_path.clone(),
            source,
        })?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|source| DatasetError::CorruptArchive {
                path: archive_path.clone(),
                source,
            })?;
        let entries = archive.len();
        archive
            .extract(root)
            .map_err(|source| DatasetError::CorruptArchive {
                path: archive_path.clone(),
                source,
            })?;

        let marker_file = File::create(&marker).map_err(|source| DatasetError::Io {
            path: marker.clone(),
            source,
        })?;
        serde_json::to_writer_pretty(
            marker_file,
            &ExtractionMarker {
                url: url.to_owned(),
                entries,
            },
        )
        .map_err(|source| DatasetError::Io {
            path: marker.clone(),
            source: source.into(),
        })?;

        fs::remove_file(&archive_path).map_err(|source| DatasetError::Io {
            path: archive_path.clone(),
            source,
        })?;
        log::info!("extracted {entries} entries from {}", archive_name(url));
        Ok(())
    }
}

fn archive_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn marker_path(root: &Path, url: &str) -> PathBuf {
    let stem = archive_name(url).trim_end_matches(".zip");
    root.join(format!(".{stem}.extracted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    struct MockFetcher {
        archives: HashMap<String, Vec<u8>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn new(archives: HashMap<String, Vec<u8>>) -> Self {
            Self {
                archives,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ArchiveFetcher for MockFetcher {
        fn fetch(&self, url: &str) -> DatasetResult<Vec<u8>> {
            self.calls.lock().unwrap().push(url.to_owned());
            self.archives
                .get(url)
                .cloned()
                .ok_or_else(|| DatasetError::Network {
                    url: url.to_owned(),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "mock: no such archive",
                    )),
                })
        }
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn full_mock() -> MockFetcher {
        let archives = ARCHIVE_URLS
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let entry = format!("subject_{i}/img.png");
                (
                    (*url).to_owned(),
                    zip_bytes(&[(entry.as_str(), b"pixels".as_slice())]),
                )
            })
            .collect();
        MockFetcher::new(archives)
    }

    fn zip_files_in(root: &Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext == "zip")
                    .unwrap_or(false)
            })
            .count()
    }

    #[test]
    fn extracts_union_of_all_archives() {
        let root = TempDir::new().unwrap();
        BulkDownload::with_fetcher(full_mock()).run(root.path()).unwrap();

        for i in 0..ARCHIVE_URLS.len() {
            let extracted = root.path().join(format!("subject_{i}/img.png"));
            assert_eq!(fs::read(&extracted).unwrap(), b"pixels");
        }
        // temporary archives are gone, markers remain
        assert_eq!(zip_files_in(root.path()), 0);
        for url in ARCHIVE_URLS {
            let marker: ExtractionMarker =
                serde_json::from_reader(File::open(marker_path(root.path(), url)).unwrap())
                    .unwrap();
            assert_eq!(marker.url, url);
            assert_eq!(marker.entries, 1);
        }
    }

    #[test]
    fn rerun_skips_completed_archives() {
        let root = TempDir::new().unwrap();
        BulkDownload::with_fetcher(full_mock()).run(root.path()).unwrap();

        // everything is marked, so a fetcher with no archives never gets asked
        let empty = MockFetcher::new(HashMap::new());
        let download = BulkDownload::with_fetcher(empty);
        download.run(root.path()).unwrap();
        assert_eq!(download.fetcher.call_count(), 0);
    }

    #[test]
    fn failure_keeps_completed_markers_and_resumes() {
        let root = TempDir::new().unwrap();

        // only the first two archives are reachable
        let mut archives = HashMap::new();
        for (i, url) in ARCHIVE_URLS.iter().take(2).enumerate() {
            let entry = format!("subject_{i}/img.png");
            archives.insert(
                (*url).to_owned(),
                zip_bytes(&[(entry.as_str(), b"pixels".as_slice())]),
            );
        }
        let result = BulkDownload::with_fetcher(MockFetcher::new(archives)).run(root.path());
        assert!(matches!(result, Err(DatasetError::Network { ref url, .. }) if url == ARCHIVE_URLS[2]));
        assert!(marker_path(root.path(), ARCHIVE_URLS[0]).exists());
        assert!(marker_path(root.path(), ARCHIVE_URLS[1]).exists());
        assert!(!marker_path(root.path(), ARCHIVE_URLS[2]).exists());

        // rerun with everything reachable: only the remaining six are fetched
        let download = BulkDownload::with_fetcher(full_mock());
        download.run(root.path()).unwrap();
        assert_eq!(download.fetcher.call_count(), ARCHIVE_URLS.len() - 2);
    }

    #[test]
    fn garbage_bytes_are_a_corrupt_archive() {
        let root = TempDir::new().unwrap();
        let archives = ARCHIVE_URLS
            .iter()
            .map(|url| ((*url).to_owned(), b"not a zip".to_vec()))
            .collect();
        let result = BulkDownload::with_fetcher(MockFetcher::new(archives)).run(root.path());
        assert!(matches!(result, Err(DatasetError::CorruptArchive { .. })));
    }
}
