//! Access to the clusters and tracking bounds of a recording session.
//!
//! The pipeline only relies on the [`SessionProvider`] trait. [`JsonSession`] implements it
//! for sessions exported to JSON, with one record per cluster.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::core::spike_train::{SpikeTrain, TrackingWindow};
use crate::error::NCError;

/// Areas which can be used as general filters, matching every area they prefix.
pub const GENERAL_AREAS: [&str; 5] = ["A", "M", "P", "S", "V"];

/// Curation label of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    Good,
    Mua,
}

/// Spiking profile of a cluster: regular spiking or fast spiking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpikingProfile {
    RS,
    FS,
}

/// Metadata and spikes of a single cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: String,
    pub area: String,
    pub cluster_type: ClusterType,
    pub profile: SpikingProfile,
    pub channel: u32,
    /// Spike times, in seconds.
    pub spike_times: Vec<f64>,
}

/// Criteria selecting the clusters of interest. `None` criteria accept everything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterFilter {
    pub areas: Option<Vec<String>>,
    pub cluster_type: Option<ClusterType>,
    pub profile: Option<SpikingProfile>,
    pub sort_ch_num: bool,
}

impl ClusterFilter {
    fn area_matches(&self, area: &str) -> bool {
        match &self.areas {
            None => true,
            Some(areas) => areas.iter().any(|filter| {
                filter == area
                    || (GENERAL_AREAS.contains(&filter.as_str()) && area.starts_with(filter.as_str()))
            }),
        }
    }

    pub fn matches(&self, cluster: &ClusterRecord) -> bool {
        self.area_matches(&cluster.area)
            && self.cluster_type.map_or(true, |t| t == cluster.cluster_type)
            && self.profile.map_or(true, |p| p == cluster.profile)
    }
}

/// The spike trains of the requested clusters, with the tracking bounds of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub tracking: TrackingWindow,
    pub spike_trains: Vec<SpikeTrain>,
}

impl SessionData {
    pub fn spike_train(&self, id: &str) -> Result<&SpikeTrain, NCError> {
        self.spike_trains
            .iter()
            .find(|st| st.id() == id)
            .ok_or_else(|| NCError::ClusterNotFound(id.to_string()))
    }
}

/// Provider of session metadata and spike data.
pub trait SessionProvider {
    /// Returns the IDs of the clusters passing the filter, in a stable order.
    fn eligible_clusters(&self, filter: &ClusterFilter) -> Result<Vec<String>, NCError>;

    /// Returns the spike trains of the given clusters and the tracking bounds.
    fn load_clusters(&self, ids: &[String]) -> Result<SessionData, NCError>;
}

/// A session stored as a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSession {
    pub name: String,
    /// Start and stop of the tracking, in seconds.
    pub tracking_ts: [f64; 2],
    pub clusters: Vec<ClusterRecord>,
}

impl JsonSession {
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), NCError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| NCError::IOError(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<JsonSession, NCError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| NCError::IOError(e.to_string()))
    }
}

impl SessionProvider for JsonSession {
    fn eligible_clusters(&self, filter: &ClusterFilter) -> Result<Vec<String>, NCError> {
        let mut eligible: Vec<&ClusterRecord> =
            self.clusters.iter().filter(|c| filter.matches(c)).collect();
        if filter.sort_ch_num {
            eligible.sort_by_key(|c| c.channel);
        }
        log::info!(
            "{} of {} clusters are eligible in session {}",
            eligible.len(),
            self.clusters.len(),
            self.name
        );
        Ok(eligible.into_iter().map(|c| c.id.clone()).collect())
    }

    fn load_clusters(&self, ids: &[String]) -> Result<SessionData, NCError> {
        let tracking = TrackingWindow::build(self.tracking_ts[0], self.tracking_ts[1])?;
        let spike_trains = ids
            .iter()
            .map(|id| {
                self.clusters
                    .iter()
                    .find(|c| &c.id == id)
                    .ok_or_else(|| NCError::ClusterNotFound(id.clone()))
                    .and_then(|c| SpikeTrain::build(c.id.as_str(), &c.spike_times))
            })
            .collect::<Result<Vec<SpikeTrain>, NCError>>()?;
        Ok(SessionData {
            tracking,
            spike_trains,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cluster(id: &str, area: &str, cluster_type: ClusterType, profile: SpikingProfile, channel: u32) -> ClusterRecord {
        ClusterRecord {
            id: id.to_string(),
            area: area.to_string(),
            cluster_type,
            profile,
            channel,
            spike_times: vec![1.0, 2.0],
        }
    }

    fn session() -> JsonSession {
        JsonSession {
            name: "bruno_distal_s1".to_string(),
            tracking_ts: [0.5, 10.0],
            clusters: vec![
                cluster("imec0_cl0003_ch120", "M1", ClusterType::Good, SpikingProfile::RS, 120),
                cluster("imec0_cl0001_ch010", "S1HL", ClusterType::Mua, SpikingProfile::FS, 10),
                cluster("imec0_cl0002_ch050", "M2", ClusterType::Good, SpikingProfile::FS, 50),
                cluster("imec0_cl0004_ch200", "PPC", ClusterType::Good, SpikingProfile::RS, 200),
            ],
        }
    }

    #[test]
    fn test_area_filter() {
        let session = session();

        let filter = ClusterFilter::default();
        assert_eq!(session.eligible_clusters(&filter).unwrap().len(), 4);

        // General area matches every area it prefixes
        let filter = ClusterFilter {
            areas: Some(vec!["M".to_string()]),
            ..Default::default()
        };
        assert_eq!(
            session.eligible_clusters(&filter).unwrap(),
            vec!["imec0_cl0003_ch120", "imec0_cl0002_ch050"]
        );

        // Specific areas only match themselves
        let filter = ClusterFilter {
            areas: Some(vec!["M2".to_string(), "PP".to_string()]),
            ..Default::default()
        };
        assert_eq!(session.eligible_clusters(&filter).unwrap(), vec!["imec0_cl0002_ch050"]);
    }

    #[test]
    fn test_type_profile_and_sort() {
        let session = session();
        let filter = ClusterFilter {
            cluster_type: Some(ClusterType::Good),
            profile: None,
            sort_ch_num: true,
            ..Default::default()
        };
        assert_eq!(
            session.eligible_clusters(&filter).unwrap(),
            vec!["imec0_cl0002_ch050", "imec0_cl0003_ch120", "imec0_cl0004_ch200"]
        );

        let filter = ClusterFilter {
            profile: Some(SpikingProfile::FS),
            ..Default::default()
        };
        assert_eq!(
            session.eligible_clusters(&filter).unwrap(),
            vec!["imec0_cl0001_ch010", "imec0_cl0002_ch050"]
        );
    }

    #[test]
    fn test_load_clusters() {
        let session = session();
        let ids = vec!["imec0_cl0002_ch050".to_string(), "imec0_cl0004_ch200".to_string()];
        let data = session.load_clusters(&ids).unwrap();
        assert_eq!(data.tracking, TrackingWindow::build(0.5, 10.0).unwrap());
        assert_eq!(data.spike_trains.len(), 2);
        assert_eq!(data.spike_train("imec0_cl0004_ch200").unwrap().times(), &[1.0, 2.0]);
        assert!(data.spike_train("imec0_cl0001_ch010").is_err());

        let missing = vec!["imec1_cl0001_ch001".to_string()];
        assert_eq!(
            session.load_clusters(&missing),
            Err(NCError::ClusterNotFound("imec1_cl0001_ch001".to_string()))
        );
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let session = session();
        session.save_to(&path).unwrap();
        assert_eq!(JsonSession::load_from(&path).unwrap(), session);
    }
}
