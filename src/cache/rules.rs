//! Request classification into cache tiers.

use reqwest::Method;

use super::traits::Request;

/// Caching policy applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
  /// Cache-first against the versioned shell store
  Shell,
  /// Stale-while-revalidate against the data store
  Data,
  /// Not cache-eligible (non-GET); always hits the network
  Passthrough,
}

/// Allow-list of data-tier patterns; everything else is shell.
#[derive(Debug, Clone)]
pub struct Rules {
  data_patterns: Vec<String>,
}

impl Rules {
  pub fn new(data_patterns: Vec<String>) -> Self {
    Self { data_patterns }
  }

  /// Patterns are matched as substrings of `host + path`, so both
  /// endpoint paths (`blocos.json`) and hosts (`api.open-meteo`) work.
  pub fn classify(&self, request: &Request) -> Tier {
    if request.method != Method::GET {
      return Tier::Passthrough;
    }

    let target = format!(
      "{}{}",
      request.url.host_str().unwrap_or_default(),
      request.url.path()
    );

    if self
      .data_patterns
      .iter()
      .any(|pattern| target.contains(pattern.as_str()))
    {
      Tier::Data
    } else {
      Tier::Shell
    }
  }
}
