// lake_exporter - Prometheus metrics exporter for wassertemperatur.org
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::record::LakeRecord;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Url;

/// Water temperature explicitly labeled as such. Lake pages also list air temperature
/// so this is preferred to any other temperature on the page. The label must not be part
/// of a longer word or a domain name (e.g. "Wassertemperatur.org" in the page branding).
const LABELED_PATTERN: &str =
    r"(?i)Wassertemperatur(?:[^.a-z0-9]|\.[^a-z0-9])\D*([0-9]+(?:[.,][0-9]+)?)\s*(?:°|&deg;|&#176;)\s*C";
const BARE_PATTERN: &str = r"(?i)([0-9]+(?:[.,][0-9]+)?)\s*(?:°|&deg;|&#176;)\s*C";
const TITLE_PATTERN: &str = r"(?is)<title(?:\s[^>]*)?>(.*?)</title\s*>";

/// Titles usually end with branding for the site after this separator.
const TITLE_SEPARATOR: &str = " - ";

/// Named pattern that extracts a temperature in celsius from page text.
///
/// The pattern must have a single capture group for the number. A number may use either
/// `.` or `,` as the decimal separator.
#[derive(Debug, Clone)]
pub struct TemperatureRule {
    name: &'static str,
    pattern: Regex,
}

impl TemperatureRule {
    pub fn new(name: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(TemperatureRule {
            name,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Temperature from the first match of this rule, `None` if there is no match or the
    /// matched text isn't a number.
    pub fn apply(&self, text: &str) -> Option<f64> {
        let caps = self.pattern.captures(text)?;
        parse_decimal(caps.get(1)?.as_str())
    }
}

/// Extracts a `LakeRecord` from the HTML of a lake page.
///
/// Extraction is pattern based and never fails: anything that can't be found on the page
/// is derived from the URL instead, or left out in the case of the temperature.
#[derive(Debug, Clone)]
pub struct LakeParser {
    rules: Vec<TemperatureRule>,
    title: Regex,
}

impl LakeParser {
    /// Create a parser with the default temperature rules: a temperature labeled as the
    /// water temperature, followed by any temperature at all.
    ///
    /// # Panics
    ///
    /// If any of the built-in patterns fail to compile, this method will panic.
    pub fn new() -> Self {
        Self::with_rules(vec![
            TemperatureRule::new("labeled", LABELED_PATTERN).unwrap(),
            TemperatureRule::new("bare", BARE_PATTERN).unwrap(),
        ])
    }

    /// Create a parser that evaluates the given rules in order, first match wins.
    ///
    /// # Panics
    ///
    /// If the built-in title pattern fails to compile, this method will panic.
    pub fn with_rules(rules: Vec<TemperatureRule>) -> Self {
        LakeParser {
            rules,
            title: Regex::new(TITLE_PATTERN).unwrap(),
        }
    }

    pub fn temperature_rules(&self) -> &[TemperatureRule] {
        &self.rules
    }

    pub fn parse(&self, text: &str, url: &Url) -> LakeRecord {
        LakeRecord {
            lake_url: url.to_string(),
            lake_id: lake_id(url),
            lake_name: self.name(text, url),
            temperature_c: self.temperature(text),
        }
    }

    /// Temperature from the first rule that matches. The `<title>` element is ignored since
    /// it names the site and the lake, not a reading.
    pub fn temperature(&self, text: &str) -> Option<f64> {
        let body = self.title.replace_all(text, " ");
        self.rules.iter().find_map(|r| r.apply(&body))
    }

    pub fn name(&self, text: &str, url: &Url) -> String {
        self.title(text).unwrap_or_else(|| name_from_url(url))
    }

    fn title(&self, text: &str) -> Option<String> {
        let caps = self.title.captures(text)?;
        let title = caps.get(1)?.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        let name = match title.split_once(TITLE_SEPARATOR) {
            Some((first, _)) => first.trim().to_owned(),
            None => title,
        };

        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

impl Default for LakeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable identifier for a lake: the last non-empty path segment of the URL, or the host
/// of the URL if the path is empty.
pub fn lake_id(url: &Url) -> String {
    match last_segment(url) {
        Some(s) => s.to_owned(),
        None => authority(url),
    }
}

fn authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_owned(),
        _ => url.to_string(),
    }
}

fn last_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.filter(|s| !s.is_empty()).last()
}

fn name_from_url(url: &Url) -> String {
    last_segment(url)
        .map(|s| percent_decode_str(s).decode_utf8_lossy().replace('-', " "))
        .map(|s| title_case(s.trim()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.to_string())
}

/// Uppercase the first letter of each word and lowercase the rest. Any character that
/// isn't a letter starts a new word.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;

    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }

    out
}

fn parse_decimal(s: &str) -> Option<f64> {
    s.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}
