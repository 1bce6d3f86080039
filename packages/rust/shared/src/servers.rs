//! Registry of repository servers that can hold file copies.

use serde::Serialize;

use crate::types::RepositorySource;

/// Repo code of the AWS object-store mirror.
pub const AWS_VIRGINIA: &str = "aws-virginia";

/// Repo code of the Collaboratory object-store mirror.
pub const COLLABORATORY: &str = "collaboratory";

/// Repo code of the CGHub archive.
pub const CGHUB: &str = "cghub";

/// Repo code of the EGA archive.
pub const EGA: &str = "ega";

/// Protocol family spoken by a repository server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepositoryKind {
    Gnos,
    Ega,
    ObjectStore,
}

/// A repository holding physical copies of files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepositoryServer {
    pub source: RepositorySource,
    pub kind: RepositoryKind,
    pub name: &'static str,
    pub code: &'static str,
    pub country: &'static str,
    pub base_url: &'static str,
}

#[rustfmt::skip]
const SERVERS: &[RepositoryServer] = &[
    RepositoryServer { source: RepositorySource::Cghub,  kind: RepositoryKind::Gnos,        name: "CGHub - Santa Cruz",      code: CGHUB,         country: "US", base_url: "https://cghub.ucsc.edu/" },
    RepositoryServer { source: RepositorySource::Ega,    kind: RepositoryKind::Ega,         name: "EGA - Hinxton",           code: EGA,           country: "UK", base_url: "https://ega.ebi.ac.uk/" },
    RepositoryServer { source: RepositorySource::Aws,    kind: RepositoryKind::ObjectStore, name: "AWS - Virginia",          code: AWS_VIRGINIA,  country: "US", base_url: "https://s3-external-1.amazonaws.com/" },
    RepositoryServer { source: RepositorySource::Collab, kind: RepositoryKind::ObjectStore, name: "Collaboratory - Toronto", code: COLLABORATORY, country: "CA", base_url: "https://www.cancercollaboratory.org:9080/" },
];

/// All known repository servers.
pub fn servers() -> &'static [RepositoryServer] {
    SERVERS
}

/// The server backing a source.
pub fn server_for(source: RepositorySource) -> &'static RepositoryServer {
    // Every source has exactly one entry in SERVERS.
    SERVERS
        .iter()
        .find(|server| server.source == source)
        .unwrap_or(&SERVERS[0])
}

/// Look up a server by repo code.
pub fn find_server(code: &str) -> Option<&'static RepositoryServer> {
    SERVERS.iter().find(|server| server.code == code)
}
