//! Input path resolution, sample data download and output directories

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

/// Sample micrograph fetched when the input file is absent
pub const SAMPLE_URL: &str = "https://ndownloader.figshare.com/files/15202565";

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("{0} is not a valid path")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to create the HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("failed to download {0}")]
    Request(String, #[source] reqwest::Error),
    #[error("failed to download {0}, status: {1}")]
    Status(String, reqwest::StatusCode),
    #[error("failed to write {1:?}")]
    Io(#[source] io::Error, PathBuf),
}
type Result<T> = std::result::Result<T, FetchError>;

/// Resolves the input file as `data_dir/base_dir/filename`
///
/// Empty file names and names with a NUL byte are rejected.
pub fn resolve_input<P, Q>(
    data_dir: P,
    base_dir: Option<Q>,
    filename: &str,
) -> std::result::Result<PathBuf, PathError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    if filename.trim().is_empty() || filename.contains('\0') {
        return Err(PathError::Invalid(filename.escape_debug().to_string()));
    }
    let mut path = data_dir.as_ref().to_path_buf();
    if let Some(base_dir) = base_dir {
        path.push(base_dir);
    }
    path.push(filename);
    Ok(path)
}

/// Retrieves the resource at `url` into the file `dest`
pub trait Fetch {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}
impl<T: Fetch + ?Sized> Fetch for &T {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        (**self).fetch(url, dest)
    }
}

/// Blocking HTTP download
pub struct HttpFetcher {
    timeout: Duration,
}
impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}
impl HttpFetcher {
    pub fn new() -> Self {
        Default::default()
    }
}

/// `<dest>.part`, where a download is written before being moved to `dest`
fn part_path(dest: &Path) -> PathBuf {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let io_err = |e| FetchError::Io(e, dest.to_path_buf());
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(FetchError::Client)?;
        let mut response = client
            .get(url)
            .send()
            .map_err(|e| FetchError::Request(url.to_string(), e))?;
        if !response.status().is_success() {
            return Err(FetchError::Status(url.to_string(), response.status()));
        }

        let part = part_path(dest);
        let mut file = BufWriter::new(File::create(&part).map_err(io_err)?);
        let bytes = response
            .copy_to(&mut file)
            .map_err(|e| FetchError::Request(url.to_string(), e))?;
        file.flush().map_err(io_err)?;
        drop(file);
        fs::rename(&part, dest).map_err(io_err)?;
        log::info!("downloaded {} bytes from {} to {:?}", bytes, url, dest);
        Ok(())
    }
}

/// Downloads `url` to `path` if `path` does not exist
///
/// Returns `true` if the file was downloaded.
pub fn ensure_local(path: &Path, url: &str, fetcher: &dyn Fetch) -> Result<bool> {
    if path.exists() {
        log::debug!("{:?} found locally", path);
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| FetchError::Io(e, parent.to_path_buf()))?;
    }
    println!("Downloading {} to {}", url, path.display());
    fetcher.fetch(url, path)?;
    Ok(true)
}

/// Creates the directory `path` if missing
///
/// Returns `true` if the directory was created.
pub fn ensure_dir(path: &Path) -> io::Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(path)?;
    log::info!("created {:?}", path);
    Ok(true)
}
