use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use delaunator::{triangulate, Point};
use itertools::Itertools;

use super::landmark::LandmarkSet;
use crate::error::{PipelineError, Result};

pub type Connection = (usize, usize);

pub const FACEMESH_LIPS: [Connection; 40] = [
    (61, 146), (146, 91), (91, 181), (181, 84), (84, 17),
    (17, 314), (314, 405), (405, 321), (321, 375), (375, 291),
    (61, 185), (185, 40), (40, 39), (39, 37), (37, 0),
    (0, 267), (267, 269), (269, 270), (270, 409), (409, 291),
    (78, 95), (95, 88), (88, 178), (178, 87), (87, 14),
    (14, 317), (317, 402), (402, 318), (318, 324), (324, 308),
    (78, 191), (191, 80), (80, 81), (81, 82), (82, 13),
    (13, 312), (312, 311), (311, 310), (310, 415), (415, 308),
];

pub const FACEMESH_LEFT_EYE: [Connection; 16] = [
    (263, 249), (249, 390), (390, 373), (373, 374), (374, 380), (380, 381), (381, 382), (382, 362),
    (263, 466), (466, 388), (388, 387), (387, 386), (386, 385), (385, 384), (384, 398), (398, 362),
];

pub const FACEMESH_LEFT_EYEBROW: [Connection; 8] = [
    (276, 283), (283, 282), (282, 295), (295, 285),
    (300, 293), (293, 334), (334, 296), (296, 336),
];

pub const FACEMESH_RIGHT_EYE: [Connection; 16] = [
    (33, 7), (7, 163), (163, 144), (144, 145), (145, 153), (153, 154), (154, 155), (155, 133),
    (33, 246), (246, 161), (161, 160), (160, 159), (159, 158), (158, 157), (157, 173), (173, 133),
];

pub const FACEMESH_RIGHT_EYEBROW: [Connection; 8] = [
    (46, 53), (53, 52), (52, 65), (65, 55),
    (70, 63), (63, 105), (105, 66), (66, 107),
];

pub const FACEMESH_FACE_OVAL: [Connection; 36] = [
    (10, 338), (338, 297), (297, 332), (332, 284), (284, 251), (251, 389),
    (389, 356), (356, 454), (454, 323), (323, 361), (361, 288), (288, 397),
    (397, 365), (365, 379), (379, 378), (378, 400), (400, 377), (377, 152),
    (152, 148), (148, 176), (176, 149), (149, 150), (150, 136), (136, 172),
    (172, 58), (58, 132), (132, 93), (93, 234), (234, 127), (127, 162),
    (162, 21), (21, 54), (54, 103), (103, 67), (67, 109), (109, 10),
];

/// Landmark index pairs joined into mesh edges.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionGraph {
    edges: Cow<'static, [Connection]>,
}

impl ConnectionGraph {
    pub const fn from_static(edges: &'static [Connection]) -> Self {
        Self { edges: Cow::Borrowed(edges) }
    }

    /// Build a graph from arbitrary pairs, dropping repeated edges.
    pub fn from_pairs<I: IntoIterator<Item = Connection>>(pairs: I) -> Self {
        Self {
            edges: Cow::Owned(pairs.into_iter().unique().collect()),
        }
    }

    /// Outline of lips, eyes, eyebrows and face oval.
    pub fn face_mesh_contours() -> Self {
        Self::from_pairs(
            FACEMESH_LIPS
                .into_iter()
                .chain(FACEMESH_LEFT_EYE)
                .chain(FACEMESH_LEFT_EYEBROW)
                .chain(FACEMESH_RIGHT_EYE)
                .chain(FACEMESH_RIGHT_EYEBROW)
                .chain(FACEMESH_FACE_OVAL),
        )
    }

    /// Read a JSON array of `[start, end]` pairs, e.g. a full tessellation table.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
            .map_err(|err| PipelineError::Connections(format!("{}: {err}", path.display())))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let pairs: Vec<[usize; 2]> =
            serde_json::from_str(text).map_err(|err| PipelineError::Connections(err.to_string()))?;
        if pairs.is_empty() {
            return Err(PipelineError::Connections("no connections listed".to_string()));
        }
        Ok(Self::from_pairs(pairs.into_iter().map(|[start, end]| (start, end))))
    }

    /// Delaunay triangulation of the face's (x, y) landmark positions: every
    /// triangle edge once, as `(lower, higher)` index pairs.
    pub fn tessellate(face: &LandmarkSet) -> Self {
        let points = face
            .landmarks
            .iter()
            .map(|landmark| Point { x: landmark.x as f64, y: landmark.y as f64 })
            .collect::<Vec<_>>();
        let triangulation = triangulate(&points);
        let edges: Vec<Connection> = if triangulation.triangles.is_empty() {
            // collinear input has no triangles, keep the path along the hull
            triangulation.hull.iter().copied().tuple_windows().collect()
        } else {
            triangulation
                .triangles
                .chunks_exact(3)
                .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])])
                .collect()
        };
        let edges = edges
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .filter(|(a, b)| a != b)
            .sorted()
            .dedup();
        Self::from_pairs(edges)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.edges.iter()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.edges.iter().map(|&(start, end)| start.max(end)).max()
    }
}

/// Which edges get drawn over a detected face.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshGraph {
    /// Triangulated face surface computed from each detected face.
    Tessellation,
    /// Lips, eyes, eyebrows and face oval.
    Contours,
    /// A fixed table, e.g. loaded with [`ConnectionGraph::from_json_file`].
    Fixed(ConnectionGraph),
}

impl MeshGraph {
    pub fn resolve(&self, face: &LandmarkSet) -> Cow<'_, ConnectionGraph> {
        match self {
            MeshGraph::Tessellation => Cow::Owned(ConnectionGraph::tessellate(face)),
            MeshGraph::Contours => Cow::Owned(ConnectionGraph::face_mesh_contours()),
            MeshGraph::Fixed(graph) => Cow::Borrowed(graph),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MeshGraph::Tessellation => "tessellation".to_string(),
            MeshGraph::Contours => "contours".to_string(),
            MeshGraph::Fixed(graph) => format!("{} fixed connections", graph.len()),
        }
    }
}

impl Default for MeshGraph {
    fn default() -> Self {
        MeshGraph::Tessellation
    }
}

impl FromStr for MeshGraph {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tessellation" | "tesselation" | "mesh" => Ok(MeshGraph::Tessellation),
            "contours" => Ok(MeshGraph::Contours),
            other => Err(format!("unknown mesh graph {other:?}, expected tessellation or contours")),
        }
    }
}
