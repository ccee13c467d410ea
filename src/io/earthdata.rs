//! NASA Earthdata access: login, CMR collection/granule search and granule download

use crate::io::gedi::{BeamDataSource, GediGranule};
use crate::types::{BoundingBox, FuseError, FuseResult};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Host whose `.netrc` entry holds Earthdata credentials
pub const URS_HOST: &str = "urs.earthdata.nasa.gov";

const GRANULE_PAGE_SIZE: usize = 2000;

/// CMR link relation for downloadable data
const DATA_REL: &str = "http://esipfed.org/ns/fedsearch/1.1/data#";

/// Earthdata credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Login { username: String, password: String },
    Token(String),
}

impl Credentials {
    /// `EARTHDATA_USERNAME`/`EARTHDATA_PASSWORD`, else `EARTHDATA_TOKEN`
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("EARTHDATA_USERNAME").ok();
        let password = std::env::var("EARTHDATA_PASSWORD").ok();
        if let (Some(username), Some(password)) = (username, password) {
            return Some(Credentials::Login { username, password });
        }
        std::env::var("EARTHDATA_TOKEN").ok().map(Credentials::Token)
    }

    /// Entry for [`URS_HOST`] in a `.netrc` file
    pub fn from_netrc<P: AsRef<Path>>(path: P) -> FuseResult<Option<Self>> {
        if !path.as_ref().exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(parse_netrc(&contents, URS_HOST)
            .map(|(username, password)| Credentials::Login { username, password }))
    }

    /// Environment first, then `~/.netrc`
    pub fn discover() -> FuseResult<Self> {
        if let Some(credentials) = Self::from_env() {
            log::debug!("Using Earthdata credentials from environment");
            return Ok(credentials);
        }

        if let Some(home) = dirs::home_dir() {
            let netrc = home.join(".netrc");
            if let Some(credentials) = Self::from_netrc(&netrc)? {
                log::debug!("Using Earthdata credentials from {}", netrc.display());
                return Ok(credentials);
            }
        }

        Err(FuseError::Auth(format!(
            "no Earthdata credentials: set EARTHDATA_USERNAME/EARTHDATA_PASSWORD, \
             EARTHDATA_TOKEN, or add a '{}' entry to ~/.netrc",
            URS_HOST
        )))
    }
}

/// Extract `(login, password)` for `machine` from netrc text
pub fn parse_netrc(contents: &str, machine: &str) -> Option<(String, String)> {
    let entry = Regex::new(r"machine\s+(\S+)\s+login\s+(\S+)\s+password\s+(\S+)").ok()?;
    let found = entry
        .captures_iter(contents)
        .find(|caps| &caps[1] == machine)
        .map(|caps| (caps[2].to_string(), caps[3].to_string()));
    found
}

/// Collection lookup by keyword, version and provider
#[derive(Debug, Clone)]
pub struct CollectionQuery {
    pub keyword: String,
    pub version: String,
    pub provider: String,
}

impl CollectionQuery {
    /// GEDI version 002 collections hosted by LP DAAC
    pub fn gedi() -> Self {
        Self {
            keyword: "GEDI".to_string(),
            version: "002".to_string(),
            provider: "LPCLOUD".to_string(),
        }
    }
}

/// One searchable granule and its download links
#[derive(Debug, Clone, PartialEq)]
pub struct Granule {
    pub id: String,
    pub data_links: Vec<String>,
}

/// Earth-observation archive port
pub trait GranuleArchive {
    fn login(&mut self) -> FuseResult<()>;

    /// Short name → concept id for every matching collection
    fn collection_ids(&self, query: &CollectionQuery) -> FuseResult<HashMap<String, String>>;

    fn search_granules(
        &self,
        concept_id: &str,
        temporal: (NaiveDate, NaiveDate),
        bbox: &BoundingBox,
    ) -> FuseResult<Vec<Granule>>;

    fn open(&self, granule: &Granule) -> FuseResult<Box<dyn BeamDataSource>>;
}

#[derive(Debug, Deserialize)]
struct CmrResponse<T> {
    feed: CmrFeed<T>,
}

#[derive(Debug, Deserialize)]
struct CmrFeed<T> {
    #[serde(default = "Vec::new")]
    entry: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CmrCollection {
    id: String,
    short_name: String,
}

#[derive(Debug, Deserialize)]
struct CmrGranule {
    #[serde(default)]
    producer_granule_id: Option<String>,
    title: String,
    #[serde(default)]
    links: Vec<CmrLink>,
}

#[derive(Debug, Deserialize)]
struct CmrLink {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct UrsToken {
    access_token: String,
}

fn parse_collections(body: &str) -> FuseResult<HashMap<String, String>> {
    let response: CmrResponse<CmrCollection> = serde_json::from_str(body)?;
    Ok(response
        .feed
        .entry
        .into_iter()
        .map(|c| (c.short_name, c.id))
        .collect())
}

fn parse_granules(body: &str) -> FuseResult<Vec<Granule>> {
    let response: CmrResponse<CmrGranule> = serde_json::from_str(body)?;
    Ok(response
        .feed
        .entry
        .into_iter()
        .map(|g| Granule {
            id: g.producer_granule_id.unwrap_or(g.title),
            data_links: g
                .links
                .into_iter()
                .filter(|l| l.rel == DATA_REL && l.href.starts_with("https://"))
                .map(|l| l.href)
                .collect(),
        })
        .collect())
}

/// Blocking Earthdata client; downloads granules into a local cache before opening them
pub struct EarthdataClient {
    cmr_url: String,
    urs_url: String,
    download_dir: PathBuf,
    client: reqwest::blocking::Client,
    token: Option<String>,
}

impl EarthdataClient {
    pub fn new(cmr_url: &str, urs_url: &str, download_dir: &Path) -> FuseResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(600))
            .user_agent(concat!("canopyfuse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            cmr_url: cmr_url.trim_end_matches('/').to_string(),
            urs_url: urs_url.trim_end_matches('/').to_string(),
            download_dir: download_dir.to_path_buf(),
            client,
            token: None,
        })
    }

    fn bearer(&self) -> FuseResult<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| FuseError::Auth("not logged in to Earthdata".to_string()))
    }

    /// Download the first data link of a granule unless it is already cached
    pub fn download(&self, granule: &Granule) -> FuseResult<PathBuf> {
        let url = granule
            .data_links
            .first()
            .ok_or_else(|| FuseError::Processing(format!("granule {} has no data link", granule.id)))?;
        let file_name = url.rsplit('/').next().unwrap_or(&granule.id);
        let output_path = self.download_dir.join(file_name);

        if output_path.exists() {
            log::info!("Granule {} already downloaded, skipping", file_name);
            return Ok(output_path);
        }

        std::fs::create_dir_all(&self.download_dir)?;
        log::info!("Downloading granule from: {}", url);

        let mut response = self
            .client
            .get(url)
            .bearer_auth(self.bearer()?)
            .send()?
            .error_for_status()?;

        // renamed into place only once complete
        let partial = output_path.with_extension("part");
        let mut file = std::fs::File::create(&partial)?;
        let bytes = response.copy_to(&mut file)?;
        std::fs::rename(&partial, &output_path)?;

        log::debug!("Downloaded {} bytes to {}", bytes, output_path.display());
        Ok(output_path)
    }
}

impl GranuleArchive for EarthdataClient {
    fn login(&mut self) -> FuseResult<()> {
        match Credentials::discover()? {
            Credentials::Token(token) => {
                self.token = Some(token);
            }
            Credentials::Login { username, password } => {
                let url = format!("{}/api/users/find_or_create_token", self.urs_url);
                log::info!("Logging in to Earthdata as {}", username);
                let response = self
                    .client
                    .post(&url)
                    .basic_auth(&username, Some(&password))
                    .send()?;
                if !response.status().is_success() {
                    return Err(FuseError::Auth(format!(
                        "Earthdata login failed: HTTP {}",
                        response.status().as_u16()
                    )));
                }
                let token: UrsToken = response.json()?;
                self.token = Some(token.access_token);
            }
        }
        Ok(())
    }

    fn collection_ids(&self, query: &CollectionQuery) -> FuseResult<HashMap<String, String>> {
        let url = format!("{}/collections.json", self.cmr_url);
        let body = self
            .client
            .get(&url)
            .query(&[
                ("keyword", query.keyword.as_str()),
                ("version", query.version.as_str()),
                ("provider", query.provider.as_str()),
                ("page_size", "100"),
            ])
            .send()?
            .error_for_status()?
            .text()?;
        parse_collections(&body)
    }

    fn search_granules(
        &self,
        concept_id: &str,
        temporal: (NaiveDate, NaiveDate),
        bbox: &BoundingBox,
    ) -> FuseResult<Vec<Granule>> {
        let url = format!("{}/granules.json", self.cmr_url);
        let temporal = format!("{}T00:00:00Z,{}T23:59:59Z", temporal.0, temporal.1);
        let bounding_box = bbox
            .as_array()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let page_size = GRANULE_PAGE_SIZE.to_string();

        let mut granules = Vec::new();
        for page_num in 1.. {
            let page = page_num.to_string();
            let body = self
                .client
                .get(&url)
                .query(&[
                    ("concept_id", concept_id),
                    ("temporal", temporal.as_str()),
                    ("bounding_box", bounding_box.as_str()),
                    ("page_size", page_size.as_str()),
                    ("page_num", page.as_str()),
                ])
                .send()?
                .error_for_status()?
                .text()?;

            let batch = parse_granules(&body)?;
            let fetched = batch.len();
            granules.extend(batch);
            if fetched < GRANULE_PAGE_SIZE {
                break;
            }
        }

        log::info!("Granules found: {}", granules.len());
        Ok(granules)
    }

    fn open(&self, granule: &Granule) -> FuseResult<Box<dyn BeamDataSource>> {
        let path = self.download(granule)?;
        Ok(Box::new(GediGranule::open(path)?))
    }
}
