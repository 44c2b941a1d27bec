//! Export destinations: a local directory or a Google Cloud Storage folder.

use lcmap_core::io::shapefile::encode_shapefile;
use lcmap_core::{FeatureCollection, CRS};
use reqwest::{Method, Url};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};
use crate::http::HttpClient;

const GCS_UPLOAD_URL: &str = "https://storage.googleapis.com/upload/storage/v1/b";

/// Where an export lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportDestination {
    /// A directory on the local filesystem (created if missing).
    Local(PathBuf),
    /// `gs://bucket/folder`; the folder may be empty (bucket root).
    Gcs { bucket: String, folder: String },
}

impl FromStr for ExportDestination {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CloudError::InvalidDestination(s.to_string()));
        }
        match s.strip_prefix("gs://") {
            Some(rest) => {
                let (bucket, folder) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(CloudError::InvalidDestination(s.to_string()));
                }
                Ok(Self::Gcs {
                    bucket: bucket.to_string(),
                    folder: folder.trim_matches('/').to_string(),
                })
            }
            None if s.contains("://") => Err(CloudError::InvalidDestination(s.to_string())),
            None => Ok(Self::Local(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for ExportDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(dir) => write!(f, "{}", dir.display()),
            Self::Gcs { bucket, folder } if folder.is_empty() => write!(f, "gs://{bucket}"),
            Self::Gcs { bucket, folder } => write!(f, "gs://{bucket}/{folder}"),
        }
    }
}

impl ExportDestination {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Gcs { .. })
    }

    /// Object name (GCS) or path (local) of `file` inside the destination.
    pub fn location(&self, file: &str) -> String {
        match self {
            Self::Local(dir) => dir.join(file).display().to_string(),
            Self::Gcs { bucket, folder } if folder.is_empty() => format!("gs://{bucket}/{file}"),
            Self::Gcs { bucket, folder } => format!("gs://{bucket}/{folder}/{file}"),
        }
    }

    /// JSON API media-upload URL for `file`.
    fn upload_url(bucket: &str, folder: &str, file: &str) -> Result<Url> {
        let name = if folder.is_empty() {
            file.to_string()
        } else {
            format!("{folder}/{file}")
        };
        let invalid = || CloudError::InvalidDestination(format!("gs://{bucket}/{name}"));
        let mut url = Url::parse(GCS_UPLOAD_URL).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .extend([bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &name);
        Ok(url)
    }

    /// Write named files to the destination, returning their locations.
    pub async fn put_files(
        &self,
        files: &[(String, Vec<u8>)],
        http: &HttpClient,
        auth: &dyn CloudAuth,
    ) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(files.len());
        match self {
            Self::Local(dir) => {
                std::fs::create_dir_all(dir)?;
                for (file, bytes) in files {
                    std::fs::write(dir.join(file), bytes)?;
                    written.push(self.location(file));
                }
            }
            Self::Gcs { bucket, folder } => {
                for (file, bytes) in files {
                    let url = Self::upload_url(bucket, folder, file)?;
                    http.send_bytes(Method::POST, url.as_str(), bytes, content_type(file), auth)
                        .await?;
                    written.push(self.location(file));
                }
            }
        }
        Ok(written)
    }

    /// Export features as the shapefile set `<description>.{shp,shx,dbf,prj}`.
    ///
    /// An empty feature collection is an error: nothing would be exported.
    pub async fn export_shapefile(
        &self,
        description: &str,
        features: &FeatureCollection,
        crs: &CRS,
        http: &HttpClient,
        auth: &dyn CloudAuth,
    ) -> Result<Vec<String>> {
        if features.is_empty() {
            return Err(lcmap_core::Error::Empty(format!(
                "export '{description}' has no features"
            ))
            .into());
        }
        let parts = encode_shapefile(features, crs)?;
        let files: Vec<(String, Vec<u8>)> = parts
            .files()
            .into_iter()
            .map(|(ext, bytes)| (format!("{description}.{ext}"), bytes.to_vec()))
            .collect();
        let written = self.put_files(&files, http, auth).await?;
        info!(
            destination = %self,
            description,
            features = features.len(),
            "shapefile exported"
        );
        Ok(written)
    }
}

fn content_type(file: &str) -> &'static str {
    if file.ends_with(".prj") {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuth;
    use geo::polygon;
    use lcmap_core::{AttributeValue, Feature};
    use std::time::Duration;

    fn features() -> FeatureCollection {
        vec![Feature::new(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ])
        .with_property("label", AttributeValue::Int(0))]
        .into_iter()
        .collect()
    }

    #[test]
    fn parse_destinations() {
        assert_eq!(
            "gs://my-bucket/exports/rice/".parse::<ExportDestination>().unwrap(),
            ExportDestination::Gcs {
                bucket: "my-bucket".into(),
                folder: "exports/rice".into()
            }
        );
        assert_eq!(
            "gs://my-bucket".parse::<ExportDestination>().unwrap().to_string(),
            "gs://my-bucket"
        );
        assert_eq!(
            "out/shp".parse::<ExportDestination>().unwrap(),
            ExportDestination::Local(PathBuf::from("out/shp"))
        );
        assert!("gs://".parse::<ExportDestination>().is_err());
        assert!("s3://bucket/x".parse::<ExportDestination>().is_err());
        assert!("".parse::<ExportDestination>().is_err());
    }

    #[test]
    fn upload_url_encodes_object_name() {
        assert_eq!(
            ExportDestination::upload_url("b", "rice maps/2022", "rice.shp")
                .unwrap()
                .as_str(),
            "https://storage.googleapis.com/upload/storage/v1/b/b/o?uploadType=media&name=rice+maps%2F2022%2Frice.shp"
        );
        let url = ExportDestination::upload_url("b", "", "a&b=c.dbf").unwrap();
        let name: Vec<_> = url.query_pairs().filter(|(k, _)| k == "name").collect();
        assert_eq!(name[0].1, "a&b=c.dbf");
        let dest: ExportDestination = "gs://b/f".parse().unwrap();
        assert_eq!(dest.location("rice.dbf"), "gs://b/f/rice.dbf");
        assert!(dest.is_remote());
    }

    #[tokio::test]
    async fn local_shapefile_export() {
        let dir = tempfile::tempdir().unwrap();
        let dest = ExportDestination::Local(dir.path().join("exports"));
        let http = HttpClient::new(Duration::from_secs(5), 0).unwrap();

        let written = dest
            .export_shapefile("rice", &features(), &CRS::wgs84(), &http, &NoAuth)
            .await
            .unwrap();
        assert_eq!(written.len(), 4);
        for ext in ["shp", "shx", "dbf", "prj"] {
            assert!(dir.path().join("exports").join(format!("rice.{ext}")).exists());
        }

        let empty = dest
            .export_shapefile("none", &FeatureCollection::new(), &CRS::wgs84(), &http, &NoAuth)
            .await;
        assert!(empty.is_err());
    }
}
