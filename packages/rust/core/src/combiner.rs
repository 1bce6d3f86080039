//! Merges per-source observations into canonical repository files.
//!
//! Observations are grouped by object id. An observation without one derives
//! it from analysis id and file name, which is how object stores name the same
//! physical file. Within a group observations are visited in activation order,
//! then by handle, so the output never depends on collection order.

use std::collections::{BTreeMap, HashSet};

use repoindex_shared::{
    DataType, Donor, FileCopy, FileObservation, RepositoryFile, resolve_id,
};
use tracing::{debug, warn};

use crate::collector::SourceFiles;

/// Natural key of an observation.
pub fn object_id(obs: &FileObservation) -> String {
    match obs.object_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => resolve_id(&[obs.analysis_id.as_str(), obs.file_name.as_str()]),
    }
}

/// Canonical record id for an object id.
pub fn file_id(object_id: &str) -> String {
    resolve_id(&["file", object_id])
}

/// Combine every source's observations into records sorted by id.
pub fn combine_files(sources: &[SourceFiles]) -> Vec<RepositoryFile> {
    let mut observations: Vec<&FileObservation> =
        sources.iter().flat_map(|s| s.files.iter()).collect();
    observations.sort_by(|a, b| {
        a.source
            .ordinal()
            .cmp(&b.source.ordinal())
            .then_with(|| a.handle.cmp(&b.handle))
    });

    let mut groups: BTreeMap<String, Vec<&FileObservation>> = BTreeMap::new();
    for obs in observations {
        groups.entry(object_id(obs)).or_default().push(obs);
    }

    let mut files: Vec<RepositoryFile> = groups
        .into_iter()
        .map(|(object_id, group)| merge(object_id, &group))
        .collect();
    files.sort_by(|a, b| a.id.cmp(&b.id));

    debug!(files = files.len(), "combined observations");
    files
}

fn merge(object_id: String, group: &[&FileObservation]) -> RepositoryFile {
    let id = file_id(&object_id);

    let file_name = group
        .iter()
        .map(|o| o.file_name.trim())
        .find(|n| !n.is_empty())
        .unwrap_or_default()
        .to_string();
    let size = group.iter().find_map(|o| o.size);

    let checksums: Vec<&str> = group
        .iter()
        .filter_map(|o| o.md5sum.as_deref())
        .filter(|m| !m.is_empty())
        .collect();
    let md5sum = checksums.first().map(|m| m.to_string());
    if checksums.iter().any(|m| Some(*m) != md5sum.as_deref()) {
        warn!(%id, %object_id, ?checksums, "conflicting checksums across sources");
    }

    let data_type = group
        .iter()
        .filter_map(|o| o.classify())
        .last()
        .unwrap_or(DataType::Unclassified);

    let mut file = RepositoryFile {
        id,
        object_id,
        file_name,
        md5sum,
        size,
        data_type,
        copies: merge_copies(group),
        donors: merge_donors(group),
        unresolved: false,
    };
    file.unresolved = !file.has_donor_id();
    file
}

/// Union of copies, one per `(repo_code, url)`; the first observation wins.
fn merge_copies(group: &[&FileObservation]) -> Vec<FileCopy> {
    let mut seen = HashSet::new();
    let mut copies: Vec<FileCopy> = group
        .iter()
        .flat_map(|o| o.copies.iter())
        .filter(|c| seen.insert((c.repo_code.clone(), c.url.clone())))
        .cloned()
        .collect();
    copies.sort_by(|a, b| a.repo_code.cmp(&b.repo_code).then_with(|| a.url.cmp(&b.url)));
    copies
}

/// Union of donors. Resolved donors are merged by donor id; unresolved
/// donors are only merged when identical.
fn merge_donors(group: &[&FileObservation]) -> Vec<Donor> {
    let mut resolved: BTreeMap<String, Donor> = BTreeMap::new();
    let mut unresolved: Vec<Donor> = Vec::new();

    for donor in group.iter().flat_map(|o| o.donors.iter()) {
        match donor.donor_id.as_deref().filter(|id| !id.is_empty()) {
            Some(donor_id) => {
                resolved
                    .entry(donor_id.to_string())
                    .or_insert_with(|| donor.clone());
            }
            None => {
                if !unresolved.contains(donor) {
                    unresolved.push(donor.clone());
                }
            }
        }
    }

    let mut donors: Vec<Donor> = resolved.into_values().chain(unresolved).collect();
    donors.sort();
    donors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{copy, donor, observation};
    use repoindex_shared::RepositorySource;

    fn sources(files: Vec<FileObservation>) -> Vec<SourceFiles> {
        let mut by_source: BTreeMap<RepositorySource, Vec<FileObservation>> = BTreeMap::new();
        for f in files {
            by_source.entry(f.source).or_default().push(f);
        }
        by_source
            .into_iter()
            .map(|(source, files)| SourceFiles { source, files })
            .collect()
    }

    #[test]
    fn derived_object_id_matches_object_store_key() {
        let cghub = observation(RepositorySource::Cghub, "A1/reads.bam");
        let derived = object_id(&cghub);
        assert_eq!(derived, resolve_id(&["A1", "reads.bam"]));

        let mut aws = observation(RepositorySource::Aws, "data/x");
        aws.object_id = Some(derived.clone());
        assert_eq!(object_id(&aws), derived);
    }

    #[test]
    fn derived_object_id_is_stable() {
        // Object stores publish files under this id; changing the derivation
        // breaks every cross-repository merge.
        let mut cghub = observation(RepositorySource::Cghub, "x/y");
        cghub.analysis_id = "a1b2c3d4-0000-4000-8000-000000000001".into();
        cghub.file_name = "C484.TCGA-A1-A0SB-01A.bam".into();
        assert_eq!(object_id(&cghub), "e2e68c72-e37c-5246-bcf3-d8a0ec4376f8");
    }

    #[test]
    fn deterministic_regardless_of_input_order() {
        let a = observation(RepositorySource::Cghub, "A1/reads.bam");
        let b = observation(RepositorySource::Ega, "EGAF1");
        let mut c = observation(RepositorySource::Collab, "data/c");
        c.object_id = Some(object_id(&a));

        let forward = combine_files(&sources(vec![a.clone(), b.clone(), c.clone()]));
        let mut reversed_sources = sources(vec![c, b, a]);
        reversed_sources.reverse();
        let reversed = combine_files(&reversed_sources);

        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 2);
        let ids: Vec<_> = forward.iter().map(|f| f.id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn copies_are_united_and_deduplicated() {
        let cghub = observation(RepositorySource::Cghub, "A1/reads.bam");
        let mut aws = observation(RepositorySource::Aws, "data/x");
        aws.object_id = Some(object_id(&cghub));
        aws.copies = vec![copy("aws-virginia", "data/x")];
        let mut collab = observation(RepositorySource::Collab, "data/x");
        collab.object_id = Some(object_id(&cghub));
        collab.copies = vec![copy("collaboratory", "data/x"), copy("collaboratory", "data/x")];

        let files = combine_files(&sources(vec![collab, aws, cghub]));
        assert_eq!(files.len(), 1);
        let codes: Vec<_> = files[0].copies.iter().map(|c| c.repo_code.as_str()).collect();
        assert_eq!(codes, vec!["aws-virginia", "cghub", "collaboratory"]);
    }

    #[test]
    fn last_classified_observation_wins() {
        let mut cghub = observation(RepositorySource::Cghub, "A1/reads.bam");
        cghub.analyte_code = Some("G".into());
        let mut ega = observation(RepositorySource::Ega, "EGAF1");
        ega.analysis_id = cghub.analysis_id.clone();
        ega.file_name = cghub.file_name.clone();
        ega.analyte_code = Some("R".into());
        let mut aws = observation(RepositorySource::Aws, "data/x");
        aws.object_id = Some(object_id(&cghub));
        aws.analyte_code = None;

        let files = combine_files(&sources(vec![aws, ega, cghub]));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].data_type, DataType::RnaSeq);
    }

    #[test]
    fn unknown_analyte_codes_stay_unclassified() {
        let mut obs = observation(RepositorySource::Cghub, "A1/reads.bam");
        obs.analyte_code = Some("Q".into());
        let files = combine_files(&sources(vec![obs]));
        assert_eq!(files[0].data_type, DataType::Unclassified);

        let mut none = observation(RepositorySource::Cghub, "A2/reads.bam");
        none.analyte_code = None;
        let files = combine_files(&sources(vec![none]));
        assert_eq!(files[0].data_type, DataType::Unclassified);
    }

    #[test]
    fn conflicting_checksums_keep_first() {
        let cghub = observation(RepositorySource::Cghub, "A1/reads.bam");
        let mut aws = observation(RepositorySource::Aws, "data/x");
        aws.object_id = Some(object_id(&cghub));
        aws.md5sum = Some("ffffffffffffffffffffffffffffffff".into());
        aws.file_name = String::new();

        let files = combine_files(&sources(vec![aws, cghub.clone()]));
        assert_eq!(files[0].md5sum, cghub.md5sum);
        assert_eq!(files[0].file_name, "reads.bam");
    }

    #[test]
    fn donors_merge_by_resolved_id_only() {
        let mut cghub = observation(RepositorySource::Cghub, "A1/reads.bam");
        cghub.donors = vec![donor("BRCA-US", "TCGA-1", Some("DO1")), donor("BRCA-US", "TCGA-2", None)];
        let mut ega = observation(RepositorySource::Ega, "EGAF1");
        ega.analysis_id = cghub.analysis_id.clone();
        ega.file_name = cghub.file_name.clone();
        ega.donors = vec![
            donor("BRCA-UK", "PD-1", Some("DO1")),
            donor("BRCA-US", "TCGA-2", None),
            donor("BRCA-UK", "PD-2", None),
        ];

        let files = combine_files(&sources(vec![cghub, ega]));
        let donors = &files[0].donors;
        assert_eq!(donors.len(), 3);
        assert_eq!(donors.iter().filter(|d| d.has_donor_id()).count(), 1);
        assert!(!files[0].unresolved);
    }

    #[test]
    fn files_without_resolved_donors_are_flagged() {
        let mut obs = observation(RepositorySource::Cghub, "A1/reads.bam");
        obs.donors = vec![donor("BRCA-US", "TCGA-1", None)];
        let files = combine_files(&sources(vec![obs]));
        assert!(files[0].unresolved);
    }
}
