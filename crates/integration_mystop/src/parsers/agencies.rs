//! Agency discovery (`TransitAuthorities`)

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use url::Url;

use super::{array_items, nonempty_string, raw_record};
use crate::models::AgencyDirectory;
use crate::validation::BaseUrl;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawAuthority {
    name: Value,
    rest_url: Value,
}

/// Build the agency directory from the discovery listing
///
/// Authorities without both a name and a REST URL are ignored, as are REST
/// URLs that do not form a valid base URL once cleaned. Duplicate names
/// keep the last entry.
#[must_use]
pub fn parse_agencies(data: &Value) -> AgencyDirectory {
    let mut agencies = AgencyDirectory::new();

    for raw in array_items(data).iter().filter_map(raw_record::<RawAuthority>) {
        let (Some(name), Some(rest_url)) = (nonempty_string(&raw.name), nonempty_string(&raw.rest_url))
        else {
            continue;
        };

        match clean_rest_url(&rest_url) {
            Ok(base_url) => {
                agencies.insert(name, base_url);
            },
            Err(reason) => {
                warn!(agency = %name, %rest_url, %reason, "Skipping agency with invalid REST URL");
            },
        }
    }

    agencies
}

/// Turn an advertised REST URL into an agency base URL
///
/// Drops any fragment, trailing slashes, and a trailing `/rest` segment.
///
/// # Errors
///
/// Returns a description of why the URL cannot be used.
pub fn clean_rest_url(rest_url: &str) -> Result<BaseUrl, String> {
    let mut url = Url::parse(rest_url.trim_end_matches('/')).map_err(|e| e.to_string())?;
    url.set_fragment(None);

    let cleaned = url.as_str().trim_end_matches('/');
    let cleaned = cleaned.strip_suffix("/rest").unwrap_or(cleaned);

    BaseUrl::parse(cleaned).map_err(|e| e.to_string())
}
