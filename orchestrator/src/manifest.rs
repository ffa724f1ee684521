//! In-memory form of one environment's address manifest.
//!
//! The manifest is kept as the JSON object it was read from so that key
//! order, unknown categories and the exact address text survive a run.

use frax_deploy_protocol::{Category, ManifestPath};
use serde_json::{Map, Value as Json};

/// Category → address (leaf) or category → key → address (group).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    sections: Map<String, Json>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a stored manifest. Known categories must have the expected shape;
    /// anything else is kept verbatim.
    pub fn from_json(json: Json) -> Result<Self, String> {
        let Json::Object(sections) = json else {
            return Err("environment entry is not an object".to_string());
        };
        for (name, section) in &sections {
            let Ok(category) = name.parse::<Category>() else {
                continue;
            };
            match section {
                Json::String(_) if category.is_leaf() => {}
                Json::Object(entries) if !category.is_leaf() => {
                    if let Some((key, _)) = entries.iter().find(|(_, v)| !v.is_string()) {
                        return Err(format!("`{}.{}` is not an address string", name, key));
                    }
                }
                _ if category.is_leaf() => {
                    return Err(format!("`{}` must be a single address string", name));
                }
                _ => return Err(format!("`{}` must be an object of addresses", name)),
            }
        }
        Ok(Self { sections })
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.sections.clone())
    }

    /// Address text stored at `path`, if any.
    pub fn get(&self, path: &ManifestPath) -> Option<&str> {
        let section = self.sections.get(path.category.as_str())?;
        match &path.key {
            None => section.as_str(),
            Some(key) => section.get(key)?.as_str(),
        }
    }

    /// Store `address` at `path`, creating the category if needed.
    pub fn set(&mut self, path: &ManifestPath, address: impl Into<String>) {
        let address = Json::String(address.into());
        match &path.key {
            None => {
                self.sections.insert(path.category.as_str().to_string(), address);
            }
            Some(key) => {
                let section = self
                    .sections
                    .entry(path.category.as_str())
                    .or_insert_with(|| Json::Object(Map::new()));
                if !section.is_object() {
                    *section = Json::Object(Map::new());
                }
                if let Json::Object(entries) = section {
                    entries.insert(key.clone(), address);
                }
            }
        }
    }

    /// Store `address` at `path` unless something is already there.
    pub fn set_if_absent(&mut self, path: &ManifestPath, address: impl Into<String>) {
        if self.get(path).is_none() {
            self.set(path, address);
        }
    }

    /// Deep merge: entries of `partial` overwrite, everything else stays.
    pub fn merge(&mut self, partial: &Manifest) {
        for (name, incoming) in &partial.sections {
            match (self.sections.get_mut(name), incoming) {
                (Some(Json::Object(existing)), Json::Object(entries)) => {
                    for (key, value) in entries {
                        existing.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    self.sections.insert(name.clone(), incoming.clone());
                }
            }
        }
    }

    /// Every `(slot, address)` pair of the known categories, in stored order.
    pub fn entries(&self) -> Vec<(ManifestPath, &str)> {
        let mut entries = Vec::new();
        for (name, section) in &self.sections {
            let Ok(category) = name.parse::<Category>() else {
                continue;
            };
            match section {
                Json::String(address) => entries.push((ManifestPath::leaf(category), address.as_str())),
                Json::Object(group) => {
                    for (key, value) in group {
                        if let Some(address) = value.as_str() {
                            entries.push((ManifestPath::entry(category, key.clone()), address));
                        }
                    }
                }
                _ => {}
            }
        }
        entries
    }

    /// Reorder categories into the standard layout, unknown ones last.
    pub fn normalize_order(&mut self) {
        let mut ordered = Map::new();
        for category in Category::ALL {
            if let Some(section) = self.sections.get(category.as_str()) {
                ordered.insert(category.as_str().to_string(), section.clone());
            }
        }
        for (name, section) in &self.sections {
            if !ordered.contains_key(name) {
                ordered.insert(name.clone(), section.clone());
            }
        }
        self.sections = ordered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_get_and_set() {
        let mut manifest = Manifest::new();
        let weth = ManifestPath::leaf(Category::Weth);
        let oracle = ManifestPath::entry(Category::Oracles, "FRAX_FXS");
        manifest.set(&weth, "0x00000000000000000000000000000000000000aa");
        manifest.set(&oracle, "0x00000000000000000000000000000000000000bb");

        assert_eq!(
            manifest.get(&weth),
            Some("0x00000000000000000000000000000000000000aa")
        );
        assert_eq!(
            manifest.get(&oracle),
            Some("0x00000000000000000000000000000000000000bb")
        );
        assert_eq!(
            manifest.get(&ManifestPath::entry(Category::Oracles, "FRAX_WETH")),
            None
        );
    }

    #[test]
    fn test_set_if_absent_keeps_existing() {
        let mut manifest = Manifest::new();
        let path = ManifestPath::entry(Category::Libraries, "UniswapV2Library");
        manifest.set(&path, "0x00000000000000000000000000000000000000cc");
        manifest.set_if_absent(&path, "");
        assert_eq!(
            manifest.get(&path),
            Some("0x00000000000000000000000000000000000000cc")
        );
    }

    #[test]
    fn test_rejects_wrong_shapes() {
        assert!(Manifest::from_json(json!([])).is_err());
        assert!(Manifest::from_json(json!({ "weth": { "a": "b" } })).is_err());
        assert!(Manifest::from_json(json!({ "oracles": "0x00" })).is_err());
        assert!(Manifest::from_json(json!({ "pools": { "USDC": 5 } })).is_err());
    }

    #[test]
    fn test_unknown_categories_preserved() {
        let stored = json!({
            "main": { "FRAX": "0x0000000000000000000000000000000000000001" },
            "bridges": { "anything": [1, 2, 3] }
        });
        let manifest = Manifest::from_json(stored.clone()).unwrap();
        assert_eq!(manifest.to_json(), stored);
        assert_eq!(manifest.entries().len(), 1);
    }

    #[test]
    fn test_merge_is_deep() {
        let mut base = Manifest::from_json(json!({
            "main": { "FRAX": "0x1", "FXS": "0x2" },
            "weth": "0x3"
        }))
        .unwrap();
        let partial = Manifest::from_json(json!({
            "main": { "FXS": "0x4" },
            "pools": { "USDC": "0x5" }
        }))
        .unwrap();
        base.merge(&partial);
        assert_eq!(
            base.to_json(),
            json!({
                "main": { "FRAX": "0x1", "FXS": "0x4" },
                "weth": "0x3",
                "pools": { "USDC": "0x5" }
            })
        );
    }

    #[test]
    fn test_normalize_order() {
        let mut manifest = Manifest::from_json(json!({
            "extra": {},
            "pools": {},
            "main": {}
        }))
        .unwrap();
        manifest.normalize_order();
        let keys: Vec<String> = manifest.sections.keys().cloned().collect();
        assert_eq!(keys, vec!["main", "pools", "extra"]);
    }
}
