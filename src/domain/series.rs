// Series descriptors produced by evaluating series and series group templates
use super::point::Point;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesType {
    #[default]
    Line,
    Bar,
}

impl SeriesType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "line" => Some(Self::Line),
            "bar" => Some(Self::Bar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub series_type: SeriesType,
    pub y_axis_id: String,
    pub color: Option<String>,
    pub group_id: Option<String>,
    pub data: Vec<Point>,
}

impl Series {
    pub fn first_point(&self) -> Option<&Point> {
        self.data.first()
    }

    pub fn last_point(&self) -> Option<&Point> {
        self.data.last()
    }
}

/// Display-only grouping node. Has no data of its own.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesGroup {
    pub id: String,
    pub name: String,
    pub stacked: bool,
    pub show_sum: bool,
    pub color: Option<String>,
    pub subgroups: Vec<SeriesGroup>,
}

impl SeriesGroup {
    /// Depth-first walk over this group and all nested subgroups.
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut SeriesGroup)) {
        f(self);
        for subgroup in &mut self.subgroups {
            subgroup.for_each_mut(f);
        }
    }
}

/// Accepts `#` followed by 3, 4, 6 or 8 hex digits.
pub fn normalize_color(color: Option<&str>) -> Option<String> {
    let color = color?;
    let digits = color.strip_prefix('#')?;
    let valid_length = matches!(digits.len(), 3 | 4 | 6 | 8);
    if valid_length && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(color.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_color() {
        assert_eq!(normalize_color(Some("#ff0000")), Some("#ff0000".to_string()));
        assert_eq!(normalize_color(Some("#F00")), Some("#F00".to_string()));
        assert_eq!(normalize_color(Some("#ff000080")), Some("#ff000080".to_string()));
        assert_eq!(normalize_color(Some("ff0000")), None);
        assert_eq!(normalize_color(Some("#ff00")), Some("#ff00".to_string()));
        assert_eq!(normalize_color(Some("#ff00000")), None);
        assert_eq!(normalize_color(Some("#gg0000")), None);
        assert_eq!(normalize_color(None), None);
    }

    #[test]
    fn test_group_walk_visits_subgroups() {
        let mut group = SeriesGroup {
            id: "root".to_string(),
            subgroups: vec![
                SeriesGroup {
                    id: "a".to_string(),
                    subgroups: vec![SeriesGroup {
                        id: "a1".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                SeriesGroup {
                    id: "b".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut visited = Vec::new();
        group.for_each_mut(&mut |g| visited.push(g.id.clone()));
        assert_eq!(visited, vec!["root", "a", "a1", "b"]);
    }
}
