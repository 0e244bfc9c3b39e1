// src/waypoint.rs
//! Waypoints shown on the maps and their JSON list file

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub world: String,
    pub dimension: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// ARGB
    pub color: u32,
    pub name: String,
    /// Short label drawn on the marker.
    pub display: String,
}

impl Waypoint {
    pub fn new(dimension: &str, x: f64, y: f64, z: f64, name: &str) -> Self {
        Self {
            world: String::new(),
            dimension: dimension.to_string(),
            x,
            y,
            z,
            color: 0xFFFF_0000,
            name: name.to_string(),
            display: name.chars().next().map(|c| c.to_uppercase().to_string()).unwrap_or_default(),
        }
    }

    pub fn squared_distance(&self, x: f64, y: f64, z: f64) -> f64 {
        let (dx, dy, dz) = (self.x - x, self.y - y, self.z - z);
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, x: f64, y: f64, z: f64) -> f64 {
        self.squared_distance(x, y, z).sqrt()
    }

    pub fn closer_than(&self, x: f64, y: f64, z: f64, distance: f64) -> bool {
        self.squared_distance(x, y, z) < distance * distance
    }
}

/// Waypoints of one save, stored as a JSON array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaypointList {
    waypoints: Vec<Waypoint>,
}

impl WaypointList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a list, returning an empty one when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn add(&mut self, waypoint: Waypoint) {
        self.waypoints.push(waypoint);
    }

    /// Remove the first waypoint with `name`.
    pub fn remove(&mut self, name: &str) -> Option<Waypoint> {
        let index = self.waypoints.iter().position(|w| w.name == name)?;
        Some(self.waypoints.remove(index))
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter()
    }

    /// Waypoints belonging to `dimension`, the ones drawn in that dimension's overlays.
    pub fn in_dimension<'a>(&'a self, dimension: &'a str) -> impl Iterator<Item = &'a Waypoint> + 'a {
        self.waypoints.iter().filter(move |w| w.dimension == dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let waypoint = Waypoint::new("overworld", 3.0, 0.0, 4.0, "home");
        assert_eq!(waypoint.distance(0.0, 0.0, 0.0), 5.0);
        assert!(waypoint.closer_than(0.0, 0.0, 0.0, 5.5));
        assert!(!waypoint.closer_than(0.0, 0.0, 0.0, 5.0));
        assert_eq!(waypoint.display, "H");
    }

    #[test]
    fn test_list_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypoints.json");
        assert!(WaypointList::load(&path).unwrap().is_empty());

        let mut list = WaypointList::new();
        list.add(Waypoint::new("overworld", 1.0, 64.0, 1.0, "base"));
        list.add(Waypoint::new("the_nether", 8.0, 70.0, -3.0, "portal"));
        list.save(&path).unwrap();

        let mut loaded = WaypointList::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.in_dimension("the_nether").count(), 1);
        assert!(loaded.remove("base").is_some());
        assert!(loaded.remove("base").is_none());
    }
}
