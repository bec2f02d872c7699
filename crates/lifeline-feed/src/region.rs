//! Geographic scope of the feed.

use lifeline_shared::types::Coordinates;

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub coordinates: Coordinates,
}

impl City {
    pub fn new(name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            coordinates: Coordinates::new(latitude, longitude),
        }
    }
}

/// Bounding box plus the names a place description may use for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
    /// Lowercase aliases matched against free-text place names.
    pub aliases: Vec<String>,
    /// Cities polled for weather.
    pub cities: Vec<City>,
}

impl Region {
    pub fn myanmar() -> Self {
        Self {
            name: "Myanmar".to_string(),
            min_latitude: 9.0,
            max_latitude: 29.0,
            min_longitude: 92.0,
            max_longitude: 102.0,
            aliases: vec!["myanmar".to_string(), "burma".to_string()],
            cities: vec![
                City::new("Yangon", 16.8661, 96.1951),
                City::new("Mandalay", 21.9588, 96.0891),
                City::new("Naypyidaw", 19.7633, 96.0785),
                City::new("Bago", 17.3350, 96.4890),
                City::new("Mawlamyine", 16.4910, 97.6260),
            ],
        }
    }

    pub fn contains(&self, c: Coordinates) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&c.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&c.longitude)
    }

    pub fn mentions(&self, place: &str) -> bool {
        let place = place.to_lowercase();
        self.aliases.iter().any(|alias| place.contains(alias.as_str()))
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::myanmar()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_mentions() {
        let region = Region::myanmar();
        assert!(region.contains(Coordinates::new(21.9588, 96.0891)));
        assert!(!region.contains(Coordinates::new(35.0, 139.0)));
        assert!(region.mentions("120 km N of Sagaing, Burma"));
        assert!(!region.mentions("Off the coast of Japan"));
    }
}
