// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Country names to ISO codes and flag emoji.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Code used when the country is unknown.
pub const UNKNOWN_CODE: &str = "UN";

/// Shown for codes that cannot be turned into a flag.
pub const GLOBE: &str = "\u{1F30D}";

lazy_static! {
    /// OpenSky `origin_country` names to ISO 3166-1 alpha-2.
    static ref COUNTRY_CODES: HashMap<&'static str, &'static str> = [
        ("France", "FR"),
        ("United States", "US"),
        ("Germany", "DE"),
        ("United Kingdom", "GB"),
        ("Spain", "ES"),
        ("Italy", "IT"),
        ("Canada", "CA"),
        ("Japan", "JP"),
        ("China", "CN"),
        ("Russia", "RU"),
        ("Russian Federation", "RU"),
        ("Brazil", "BR"),
        ("Australia", "AU"),
        ("India", "IN"),
        ("Mexico", "MX"),
        ("Netherlands", "NL"),
        ("Kingdom of the Netherlands", "NL"),
        ("Switzerland", "CH"),
        ("Belgium", "BE"),
        ("Austria", "AT"),
        ("Sweden", "SE"),
        ("Norway", "NO"),
        ("Denmark", "DK"),
        ("Poland", "PL"),
        ("Turkey", "TR"),
        ("Republic of Korea", "KR"),
        ("South Korea", "KR"),
        ("Singapore", "SG"),
        ("United Arab Emirates", "AE"),
        ("Qatar", "QA"),
        ("Saudi Arabia", "SA"),
        ("Thailand", "TH"),
        ("Indonesia", "ID"),
        ("Malaysia", "MY"),
        ("Philippines", "PH"),
        ("Viet Nam", "VN"),
        ("Vietnam", "VN"),
        ("Argentina", "AR"),
        ("Chile", "CL"),
        ("Colombia", "CO"),
        ("Peru", "PE"),
        ("South Africa", "ZA"),
        ("Egypt", "EG"),
        ("Morocco", "MA"),
        ("Israel", "IL"),
        ("Greece", "GR"),
        ("Portugal", "PT"),
        ("Finland", "FI"),
        ("Ireland", "IE"),
        ("Czech Republic", "CZ"),
        ("Czechia", "CZ"),
        ("Hungary", "HU"),
        ("Romania", "RO"),
        ("New Zealand", "NZ"),
        ("Luxembourg", "LU"),
        ("Iceland", "IS"),
        ("Tunisia", "TN"),
        ("Estonia", "EE"),
        ("Malta", "MT"),
    ]
    .into_iter()
    .collect();
}

/// ISO code for an OpenSky country name. Two-letter input is taken as a code.
#[must_use]
pub fn country_code(origin_country: &str) -> String {
    let name = origin_country.trim();
    if name.is_empty() {
        return UNKNOWN_CODE.to_string();
    }
    if name.chars().count() == 2 {
        return name.to_uppercase();
    }

    COUNTRY_CODES
        .get(name)
        .copied()
        .unwrap_or(UNKNOWN_CODE)
        .to_string()
}

/// Regional-indicator flag for a two-letter code, the globe otherwise.
#[must_use]
pub fn flag_emoji(code: &str) -> String {
    let letters: Vec<char> = code.trim().chars().collect();
    let [first, second] = letters.as_slice() else {
        return GLOBE.to_string();
    };

    let first = first.to_ascii_uppercase();
    let second = second.to_ascii_uppercase();
    if !first.is_ascii_uppercase() || !second.is_ascii_uppercase() {
        return GLOBE.to_string();
    }

    [first, second]
        .into_iter()
        .filter_map(|c| char::from_u32(0x1F1E6 + (u32::from(c) - u32::from('A'))))
        .collect()
}

/// Flag for an OpenSky country name.
#[must_use]
pub fn flag_for_country(origin_country: &str) -> String {
    flag_emoji(&country_code(origin_country))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code_lookup() {
        assert_eq!(country_code("France"), "FR");
        assert_eq!(country_code("Kingdom of the Netherlands"), "NL");
        assert_eq!(country_code(" Germany "), "DE");
        assert_eq!(country_code("Atlantis"), UNKNOWN_CODE);
        assert_eq!(country_code(""), UNKNOWN_CODE);
        assert_eq!(country_code("fr"), "FR");
    }

    #[test]
    fn test_flag_emoji() {
        assert_eq!(flag_emoji("FR"), "\u{1F1EB}\u{1F1F7}");
        assert_eq!(flag_emoji("us"), "\u{1F1FA}\u{1F1F8}");
        assert_eq!(flag_emoji("F"), GLOBE);
        assert_eq!(flag_emoji("FRA"), GLOBE);
        assert_eq!(flag_emoji("1A"), GLOBE);
        assert_eq!(flag_emoji("ÉA"), GLOBE);
    }

    #[test]
    fn test_flag_for_country() {
        assert_eq!(flag_for_country("Japan"), "\u{1F1EF}\u{1F1F5}");
        // Unknown countries get the United Nations code, which is a valid flag sequence.
        assert_eq!(flag_for_country("Atlantis"), "\u{1F1FA}\u{1F1F3}");
    }
}
