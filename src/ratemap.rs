//! Selection of the ratemap files of the clusters of interest.
//!
//! Ratemap files are named after the animal, recording date, bank, session and cluster they
//! were computed for, e.g. `bruno_020520_distal_s1_light_imec0_cl0001_ch001.mat`. The
//! [`RatemapFinder`] matches these names against the clusters selected in the recording
//! sessions, optionally pairing each file with the file of the same cluster in a second session
//! to measure stability.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::NCError;
use crate::session::{ClusterFilter, ClusterType, JsonSession, SessionProvider, SpikingProfile};

/// Length of a cluster ID, e.g. `imec0_cl0001_ch001`.
const CLUSTER_ID_LEN: usize = 18;
const CLUSTER_ID_PREFIX: &str = "imec";

/// Default recording banks of each animal, per area.
const DEFAULT_ROSTER: &[(&str, &[(&str, &[&str])])] = &[
    ("CaPu", &[("bruno", &["distal"])]),
    ("WhMa", &[("bruno", &["distal"])]),
    (
        "S",
        &[
            ("bruno", &["distal"]),
            ("roy", &["intermediate"]),
            ("jacopo", &["intermediate"]),
            ("crazyjoe", &["intermediate"]),
        ],
    ),
    (
        "S1HL",
        &[
            ("bruno", &["distal"]),
            ("roy", &["intermediate"]),
            ("jacopo", &["intermediate"]),
            ("crazyjoe", &["intermediate"]),
        ],
    ),
    (
        "S1Tr",
        &[
            ("bruno", &["distal"]),
            ("jacopo", &["intermediate"]),
            ("crazyjoe", &["intermediate"]),
        ],
    ),
    (
        "M",
        &[
            ("bruno", &["distal"]),
            ("roy", &["distal", "intermediate"]),
            ("jacopo", &["distal", "intermediate"]),
            ("crazyjoe", &["distal", "intermediate"]),
        ],
    ),
    (
        "M1",
        &[
            ("bruno", &["distal"]),
            ("roy", &["distal", "intermediate"]),
            ("jacopo", &["distal", "intermediate"]),
            ("crazyjoe", &["distal", "intermediate"]),
        ],
    ),
    ("M2", &[("jacopo", &["distal"]), ("crazyjoe", &["distal"])]),
    ("PPC", &[("bruno", &["distal"]), ("jacopo", &["intermediate"])]),
    (
        "A",
        &[("frank", &["distal"]), ("johnjohn", &["distal"]), ("kavorka", &["distal"])],
    ),
    (
        "A1",
        &[("frank", &["distal"]), ("johnjohn", &["distal"]), ("kavorka", &["distal"])],
    ),
    (
        "A2D",
        &[("frank", &["distal"]), ("johnjohn", &["distal"]), ("kavorka", &["distal"])],
    ),
    (
        "V",
        &[
            ("frank", &["distal", "intermediate"]),
            ("johnjohn", &["distal", "intermediate"]),
            ("kavorka", &["distal", "intermediate"]),
        ],
    ),
    (
        "V1",
        &[
            ("frank", &["distal", "intermediate"]),
            ("johnjohn", &["distal", "intermediate"]),
            ("kavorka", &["distal", "intermediate"]),
        ],
    ),
    (
        "V2M",
        &[
            ("frank", &["intermediate"]),
            ("johnjohn", &["intermediate"]),
            ("kavorka", &["intermediate"]),
        ],
    ),
    (
        "V2L",
        &[("frank", &["distal"]), ("johnjohn", &["distal"]), ("kavorka", &["distal"])],
    ),
];

/// Lookup table of the recording banks of each animal, per area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRoster(BTreeMap<String, BTreeMap<String, Vec<String>>>);

impl Default for AreaRoster {
    fn default() -> Self {
        AreaRoster(
            DEFAULT_ROSTER
                .iter()
                .map(|(area, animals)| {
                    let animals = animals
                        .iter()
                        .map(|(animal, banks)| {
                            (animal.to_string(), banks.iter().map(|b| b.to_string()).collect())
                        })
                        .collect();
                    (area.to_string(), animals)
                })
                .collect(),
        )
    }
}

impl AreaRoster {
    pub fn new(table: BTreeMap<String, BTreeMap<String, Vec<String>>>) -> Self {
        AreaRoster(table)
    }

    /// Load a roster from a JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<AreaRoster, NCError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| NCError::IOError(e.to_string()))
    }

    /// Returns the banks of every animal recorded in the area.
    pub fn animals(&self, area: &str) -> Result<&BTreeMap<String, Vec<String>>, NCError> {
        self.0
            .get(area)
            .ok_or_else(|| NCError::InvalidParameter(format!("unknown area {}", area)))
    }

    /// Returns every animal of the roster, in alphabetical order.
    pub fn all_animals(&self) -> BTreeSet<&str> {
        self.0
            .values()
            .flat_map(|animals| animals.keys().map(|a| a.as_str()))
            .collect()
    }

    /// Returns every bank of the roster, in alphabetical order.
    pub fn all_banks(&self) -> BTreeSet<&str> {
        self.0
            .values()
            .flat_map(|animals| animals.values().flatten().map(|b| b.as_str()))
            .collect()
    }

    /// Returns every bank the animal was recorded with, in any area.
    pub fn animal_banks(&self, animal: &str) -> BTreeSet<&str> {
        self.0
            .values()
            .filter_map(|animals| animals.get(animal))
            .flat_map(|banks| banks.iter().map(|b| b.as_str()))
            .collect()
    }
}

/// The selected clusters of each animal and bank.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterSets(BTreeMap<(String, String), BTreeSet<String>>);

impl ClusterSets {
    pub fn insert<I: IntoIterator<Item = String>>(&mut self, animal: &str, bank: &str, ids: I) {
        self.0
            .entry((animal.to_string(), bank.to_string()))
            .or_default()
            .extend(ids);
    }

    pub fn contains(&self, animal: &str, bank: &str, cluster_id: &str) -> bool {
        self.0
            .get(&(animal.to_string(), bank.to_string()))
            .map_or(false, |ids| ids.contains(cluster_id))
    }

    /// Whether clusters were selected for the animal and bank, possibly none.
    pub fn has_bank(&self, animal: &str, bank: &str) -> bool {
        self.0.contains_key(&(animal.to_string(), bank.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.values().map(|ids| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The ratemap files of the clusters of interest. With stability seeking, the i-th file of
/// the second session belongs to the same cluster as the i-th file of the first session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EssentialFiles {
    pub chosen_session_1: Vec<String>,
    pub chosen_session_2: Vec<String>,
}

/// Criteria selecting the files and clusters of interest. `None` criteria accept everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatemapQuery {
    pub area: String,
    pub animal_filter: Option<Vec<String>>,
    pub session_id_filter: Option<String>,
    pub session_type_filter: Option<String>,
    pub cluster_type_filter: Option<ClusterType>,
    pub profile_filter: Option<SpikingProfile>,
    /// Recording dates to consider, for animals recorded across several days.
    pub specific_dates: BTreeMap<String, Vec<String>>,
}

impl Default for RatemapQuery {
    fn default() -> Self {
        RatemapQuery {
            area: "M".to_string(),
            animal_filter: None,
            session_id_filter: Some("s1".to_string()),
            session_type_filter: None,
            cluster_type_filter: None,
            profile_filter: None,
            specific_dates: BTreeMap::from([
                ("bruno".to_string(), vec!["020520".to_string(), "030520".to_string()]),
                ("johnjohn".to_string(), vec!["210520".to_string(), "220520".to_string()]),
            ]),
        }
    }
}

impl RatemapQuery {
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<RatemapQuery, NCError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| NCError::IOError(e.to_string()))
    }

    fn date_matches(&self, animal: &str, name: &str) -> bool {
        match self.specific_dates.get(animal) {
            None => true,
            Some(dates) => dates.iter().any(|d| name.contains(d.as_str())),
        }
    }

    fn session_matches(&self, name: &str) -> bool {
        self.session_id_filter.as_ref().map_or(true, |s| name.contains(s.as_str()))
            && self.session_type_filter.as_ref().map_or(true, |s| name.contains(s.as_str()))
    }

    fn animal_matches(&self, name: &str) -> bool {
        self.animal_filter
            .as_ref()
            .map_or(true, |animals| animals.iter().any(|a| name.contains(a.as_str())))
    }

    /// The filter selecting the clusters of interest in a session.
    pub fn cluster_filter(&self) -> ClusterFilter {
        ClusterFilter {
            areas: Some(vec![self.area.clone()]),
            cluster_type: self.cluster_type_filter,
            profile: self.profile_filter,
            sort_ch_num: false,
        }
    }
}

/// Returns the cluster ID embedded in a file name, if any.
pub fn cluster_id(name: &str) -> Option<&str> {
    let start = name.find(CLUSTER_ID_PREFIX)?;
    let end = (start + CLUSTER_ID_LEN).min(name.len());
    name.get(start..end)
}

/// Returns the names of the files of a directory, in alphabetical order.
fn sorted_file_names(dir: &Path) -> Result<Vec<String>, NCError> {
    if !dir.is_dir() {
        return Err(NCError::InvalidDirectory(format!(
            "invalid location for directory {}",
            dir.display()
        )));
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Finds the ratemap files of the clusters of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct RatemapFinder {
    ratemap_dir: PathBuf,
    roster: AreaRoster,
    query: RatemapQuery,
}

impl RatemapFinder {
    pub fn new<P: Into<PathBuf>>(ratemap_dir: P, roster: AreaRoster, query: RatemapQuery) -> Self {
        RatemapFinder {
            ratemap_dir: ratemap_dir.into(),
            roster,
            query,
        }
    }

    pub fn query(&self) -> &RatemapQuery {
        &self.query
    }

    /// Returns the animal and bank a file name refers to.
    /// The bank may be omitted from the name of animals recorded with a single bank.
    fn animal_and_bank<'a>(&'a self, name: &str) -> Option<(&'a str, &'a str)> {
        let animal = self.roster.all_animals().into_iter().find(|a| name.contains(a))?;
        let banks = self.roster.animal_banks(animal);
        let bank = match self.roster.all_banks().into_iter().find(|b| name.contains(b)) {
            Some(bank) => bank,
            None if banks.len() == 1 => banks.into_iter().next()?,
            None => return None,
        };
        Some((animal, bank))
    }

    /// Select the clusters of interest in the sessions stored as JSON files in `sessions_dir`.
    ///
    /// For each animal and bank recorded in the area, the first session file whose name
    /// matches the animal, bank, session filters and recording dates is used.
    pub fn collect_clusters<P: AsRef<Path>>(&self, sessions_dir: P) -> Result<ClusterSets, NCError> {
        let names = sorted_file_names(sessions_dir.as_ref())?;
        let filter = self.query.cluster_filter();

        let mut cluster_sets = ClusterSets::default();
        for (animal, banks) in self.roster.animals(&self.query.area)?.iter() {
            for bank in banks.iter() {
                let session_file = names.iter().find(|name| {
                    name.contains(animal.as_str())
                        && name.contains(bank.as_str())
                        && self.query.session_matches(name)
                        && self.query.date_matches(animal, name)
                });
                if let Some(name) = session_file {
                    let session = JsonSession::load_from(sessions_dir.as_ref().join(name))?;
                    let ids = session.eligible_clusters(&filter)?;
                    log::debug!("Selected {} clusters of {} {} in {}", ids.len(), animal, bank, name);
                    cluster_sets.insert(animal, bank, ids);
                }
            }
        }
        Ok(cluster_sets)
    }

    /// Find the ratemap files of the selected clusters.
    ///
    /// With `seek_stability`, each file is paired with the first other file of the same
    /// animal, bank and cluster whose name contains `session_2_type`; files without such a
    /// counterpart are left out.
    pub fn find(
        &self,
        cluster_sets: &ClusterSets,
        seek_stability: bool,
        session_2_type: &str,
    ) -> Result<EssentialFiles, NCError> {
        let names = sorted_file_names(&self.ratemap_dir)?;

        let mut essential_files = EssentialFiles::default();
        for name in names.iter() {
            if !(self.query.animal_matches(name) && self.query.session_matches(name)) {
                continue;
            }
            let Some((animal, bank)) = self.animal_and_bank(name) else {
                log::debug!("Skipping {}: unknown animal or bank", name);
                continue;
            };
            let Some(cluster) = cluster_id(name) else {
                continue;
            };
            if !self.query.date_matches(animal, name) || !cluster_sets.contains(animal, bank, cluster) {
                continue;
            }

            if !seek_stability {
                essential_files.chosen_session_1.push(name.clone());
                continue;
            }
            let counterpart = names.iter().find(|other| {
                *other != name
                    && other.contains(session_2_type)
                    && other.contains(cluster)
                    && self.animal_and_bank(other) == Some((animal, bank))
                    && self.query.date_matches(animal, other)
            });
            if let Some(other) = counterpart {
                essential_files.chosen_session_1.push(name.clone());
                essential_files.chosen_session_2.push(other.clone());
            }
        }

        log::info!(
            "Search complete. Found {} valid cluster(s) in area {}.",
            essential_files.chosen_session_1.len(),
            self.query.area
        );
        Ok(essential_files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ClusterRecord;
    use tempfile::tempdir;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            File::create(dir.join(name)).unwrap();
        }
    }

    fn cluster_sets() -> ClusterSets {
        let mut sets = ClusterSets::default();
        sets.insert("bruno", "distal", vec!["imec0_cl0001_ch001".to_string()]);
        sets.insert(
            "roy",
            "intermediate",
            vec!["imec1_cl0007_ch070".to_string(), "imec1_cl0008_ch080".to_string()],
        );
        sets
    }

    #[test]
    fn test_default_roster() {
        let roster = AreaRoster::default();
        let animals = roster.animals("M").unwrap();
        assert_eq!(animals.len(), 4);
        assert_eq!(animals["roy"], vec!["distal", "intermediate"]);
        assert_eq!(roster.animals("V2M").unwrap()["kavorka"], vec!["intermediate"]);
        assert!(roster.animals("XYZ").is_err());

        assert_eq!(roster.all_animals().len(), 7);
        assert_eq!(roster.all_banks().into_iter().collect::<Vec<_>>(), vec!["distal", "intermediate"]);
        assert_eq!(roster.animal_banks("bruno").into_iter().collect::<Vec<_>>(), vec!["distal"]);
    }

    #[test]
    fn test_cluster_id() {
        assert_eq!(
            cluster_id("bruno_020520_s1_light_imec0_cl0001_ch001_ratemap.mat"),
            Some("imec0_cl0001_ch001")
        );
        assert_eq!(cluster_id("short_imec0_cl1"), Some("imec0_cl1"));
        assert_eq!(cluster_id("no_cluster.mat"), None);
    }

    #[test]
    fn test_find_single_session() {
        let dir = tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "bruno_020520_s1_light_imec0_cl0001_ch001.mat",
                "bruno_020520_s2_dark_imec0_cl0001_ch001.mat",
                // Wrong date
                "bruno_010520_s1_light_imec0_cl0001_ch001.mat",
                // Not selected
                "bruno_020520_s1_light_imec0_cl0002_ch002.mat",
                "roy_intermediate_s1_light_imec1_cl0007_ch070.mat",
                // Selected in the other bank only
                "roy_distal_s1_light_imec1_cl0008_ch080.mat",
                "roy_intermediate_s1_dark_imec1_cl0008_ch080.mat",
            ],
        );
        let finder = RatemapFinder::new(dir.path(), AreaRoster::default(), RatemapQuery::default());
        let files = finder.find(&cluster_sets(), false, "light").unwrap();
        assert_eq!(
            files.chosen_session_1,
            vec![
                "bruno_020520_s1_light_imec0_cl0001_ch001.mat",
                "roy_intermediate_s1_dark_imec1_cl0008_ch080.mat",
                "roy_intermediate_s1_light_imec1_cl0007_ch070.mat",
            ]
        );
        assert!(files.chosen_session_2.is_empty());

        let query = RatemapQuery {
            session_type_filter: Some("light".to_string()),
            animal_filter: Some(vec!["roy".to_string()]),
            ..Default::default()
        };
        let finder = RatemapFinder::new(dir.path(), AreaRoster::default(), query);
        let files = finder.find(&cluster_sets(), false, "light").unwrap();
        assert_eq!(files.chosen_session_1, vec!["roy_intermediate_s1_light_imec1_cl0007_ch070.mat"]);
    }

    #[test]
    fn test_find_stability() {
        let dir = tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "bruno_020520_s1_dark_imec0_cl0001_ch001.mat",
                "bruno_030520_s3_light_imec0_cl0001_ch001.mat",
                "roy_intermediate_s1_dark_imec1_cl0007_ch070.mat",
                // Other bank, not a counterpart
                "roy_distal_s2_light_imec1_cl0007_ch070.mat",
            ],
        );
        let query = RatemapQuery {
            session_type_filter: Some("dark".to_string()),
            ..Default::default()
        };
        let finder = RatemapFinder::new(dir.path(), AreaRoster::default(), query);
        let files = finder.find(&cluster_sets(), true, "light").unwrap();
        assert_eq!(files.chosen_session_1, vec!["bruno_020520_s1_dark_imec0_cl0001_ch001.mat"]);
        assert_eq!(files.chosen_session_2, vec!["bruno_030520_s3_light_imec0_cl0001_ch001.mat"]);
    }

    #[test]
    fn test_invalid_directory() {
        let dir = tempdir().unwrap();
        let finder = RatemapFinder::new(
            dir.path().join("missing"),
            AreaRoster::default(),
            RatemapQuery::default(),
        );
        assert!(matches!(
            finder.find(&ClusterSets::default(), false, "light"),
            Err(NCError::InvalidDirectory(_))
        ));
        assert!(matches!(
            finder.collect_clusters(dir.path().join("missing")),
            Err(NCError::InvalidDirectory(_))
        ));
    }

    #[test]
    fn test_collect_clusters() {
        let dir = tempdir().unwrap();
        let cluster = |id: &str, area: &str| ClusterRecord {
            id: id.to_string(),
            area: area.to_string(),
            cluster_type: ClusterType::Good,
            profile: SpikingProfile::RS,
            channel: 1,
            spike_times: vec![],
        };
        let session = JsonSession {
            name: "roy_intermediate_s1_light".to_string(),
            tracking_ts: [0.0, 100.0],
            clusters: vec![
                cluster("imec1_cl0007_ch070", "M1"),
                cluster("imec1_cl0009_ch090", "S1HL"),
            ],
        };
        session.save_to(dir.path().join("roy_intermediate_s1_light.json")).unwrap();
        // Wrong session
        session.save_to(dir.path().join("roy_distal_s2_light.json")).unwrap();

        let finder = RatemapFinder::new(dir.path(), AreaRoster::default(), RatemapQuery::default());
        let sets = finder.collect_clusters(dir.path()).unwrap();
        assert_eq!(sets.len(), 1);
        assert!(sets.contains("roy", "intermediate", "imec1_cl0007_ch070"));
        assert!(!sets.contains("roy", "intermediate", "imec1_cl0009_ch090"));
        assert!(!sets.has_bank("roy", "distal"));
    }
}
