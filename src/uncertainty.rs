//! # Quake Logic Tree: Uncertainties
//!
//! Table of Contents:
//! 1. UncertaintyType - The closed set of branchset uncertainty kinds
//! 2. Uncertainty - Tagged payload carried by a branch
//! 3. Parsing - `uncertaintyModel` node to payload
//! 4. Geometry validation
//! 5. Node output

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LogicTreeError, Result};
use crate::gsim::Gsim;
use crate::node::Node;

// ─────────────────────────────────────────────
// 1. UncertaintyType
// ─────────────────────────────────────────────

/// Kind of uncertainty a branchset describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UncertaintyType {
    /// Alternative source model files
    #[serde(rename = "sourceModel")]
    SourceModel,
    /// Source model files extending the base model
    #[serde(rename = "extendModel")]
    ExtendModel,
    /// Alternative ground motion models
    #[serde(rename = "gmpeModel")]
    GmpeModel,
    /// Increment of the GR maximum magnitude
    #[serde(rename = "maxMagGRRelative")]
    MaxMagGrRelative,
    /// Increment of the GR b value
    #[serde(rename = "bGRRelative")]
    BGrRelative,
    /// GR maximum magnitude
    #[serde(rename = "maxMagGRAbsolute")]
    MaxMagGrAbsolute,
    /// GR a and b values
    #[serde(rename = "abGRAbsolute")]
    AbGrAbsolute,
    /// Incremental magnitude-frequency distribution
    #[serde(rename = "incrementalMFDAbsolute")]
    IncrementalMfdAbsolute,
    /// Truncated GR computed from slip rate and rigidity
    #[serde(rename = "truncatedGRFromSlipAbsolute")]
    TruncatedGrFromSlipAbsolute,
    /// Increment of the simple fault dip
    #[serde(rename = "simpleFaultDipRelative")]
    SimpleFaultDipRelative,
    /// Simple fault dip
    #[serde(rename = "simpleFaultDipAbsolute")]
    SimpleFaultDipAbsolute,
    /// Simple fault geometry
    #[serde(rename = "simpleFaultGeometryAbsolute")]
    SimpleFaultGeometryAbsolute,
    /// Complex fault geometry
    #[serde(rename = "complexFaultGeometryAbsolute")]
    ComplexFaultGeometryAbsolute,
    /// Characteristic fault surface
    #[serde(rename = "characteristicFaultGeometryAbsolute")]
    CharacteristicFaultGeometryAbsolute,
}

impl UncertaintyType {
    /// Every known type
    pub const ALL: [UncertaintyType; 14] = [
        Self::SourceModel,
        Self::ExtendModel,
        Self::GmpeModel,
        Self::MaxMagGrRelative,
        Self::BGrRelative,
        Self::MaxMagGrAbsolute,
        Self::AbGrAbsolute,
        Self::IncrementalMfdAbsolute,
        Self::TruncatedGrFromSlipAbsolute,
        Self::SimpleFaultDipRelative,
        Self::SimpleFaultDipAbsolute,
        Self::SimpleFaultGeometryAbsolute,
        Self::ComplexFaultGeometryAbsolute,
        Self::CharacteristicFaultGeometryAbsolute,
    ];

    /// Name used in the logic tree files
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceModel => "sourceModel",
            Self::ExtendModel => "extendModel",
            Self::GmpeModel => "gmpeModel",
            Self::MaxMagGrRelative => "maxMagGRRelative",
            Self::BGrRelative => "bGRRelative",
            Self::MaxMagGrAbsolute => "maxMagGRAbsolute",
            Self::AbGrAbsolute => "abGRAbsolute",
            Self::IncrementalMfdAbsolute => "incrementalMFDAbsolute",
            Self::TruncatedGrFromSlipAbsolute => "truncatedGRFromSlipAbsolute",
            Self::SimpleFaultDipRelative => "simpleFaultDipRelative",
            Self::SimpleFaultDipAbsolute => "simpleFaultDipAbsolute",
            Self::SimpleFaultGeometryAbsolute => "simpleFaultGeometryAbsolute",
            Self::ComplexFaultGeometryAbsolute => "complexFaultGeometryAbsolute",
            Self::CharacteristicFaultGeometryAbsolute => "characteristicFaultGeometryAbsolute",
        }
    }

    /// Absolute uncertainties replace a source parameter
    pub fn is_absolute(self) -> bool {
        self.as_str().ends_with("Absolute")
    }

    /// True for the types whose payload is a list of source model files
    pub fn is_source_model(self) -> bool {
        matches!(self, Self::SourceModel | Self::ExtendModel)
    }

    /// True for the dip uncertainties, which need `applyToSources`
    pub fn is_fault_dip(self) -> bool {
        matches!(self, Self::SimpleFaultDipRelative | Self::SimpleFaultDipAbsolute)
    }
}

impl fmt::Display for UncertaintyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UncertaintyType {
    type Err = LogicTreeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LogicTreeError::value(format!("unknown uncertainty type '{s}'")))
    }
}

// ─────────────────────────────────────────────
// 2. Uncertainty
// ─────────────────────────────────────────────

/// Simple fault geometry: trace, seismogenic depths, dip and mesh spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleFaultGeometry {
    /// Fault trace as (lon, lat) points
    pub trace: Vec<(f64, f64)>,
    /// Upper seismogenic depth
    pub upper_seismo_depth: f64,
    /// Lower seismogenic depth
    pub lower_seismo_depth: f64,
    /// Dip angle
    pub dip: f64,
    /// Mesh spacing
    pub spacing: f64,
}

/// Complex fault geometry: ordered edges from top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexFaultGeometry {
    /// Edges as (lon, lat, depth) points
    pub edges: Vec<Vec<(f64, f64, f64)>>,
    /// Mesh spacing
    pub spacing: f64,
}

/// Planar surface given by its corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanarSurface {
    /// topLeft, topRight, bottomRight, bottomLeft as (lon, lat, depth)
    pub corners: [(f64, f64, f64); 4],
    /// Mesh spacing
    pub spacing: f64,
}

/// One component of a characteristic fault surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FaultSurface {
    /// Simple fault surface
    Simple(SimpleFaultGeometry),
    /// Complex fault surface
    Complex(ComplexFaultGeometry),
    /// Planar surface
    Planar(PlanarSurface),
}

/// Payload of a branch, one variant per family of uncertainty types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Uncertainty {
    /// Source model files (empty for a branch reduced away)
    SourceModel(Vec<String>),
    /// Ground motion model
    Gsim(Gsim),
    /// Scalar for the relative types, `maxMagGRAbsolute` and the dip
    Float(f64),
    /// GR a and b values
    AbGr {
        /// a value
        a: f64,
        /// b value
        b: f64,
    },
    /// Incremental MFD
    IncrementalMfd {
        /// Minimum magnitude
        min_mag: f64,
        /// Bin width
        bin_width: f64,
        /// Occurrence rates per bin
        occur_rates: Vec<f64>,
    },
    /// Slip rate and rigidity
    SlipRate {
        /// Slip rate
        slip_rate: f64,
        /// Rigidity
        rigidity: f64,
    },
    /// Simple fault geometry
    SimpleFault(SimpleFaultGeometry),
    /// Complex fault geometry
    ComplexFault(ComplexFaultGeometry),
    /// Characteristic fault surfaces
    Characteristic(Vec<FaultSurface>),
}

impl Uncertainty {
    /// The source model files, empty for other payloads
    pub fn filenames(&self) -> &[String] {
        match self {
            Self::SourceModel(fnames) => fnames,
            _ => &[],
        }
    }

    /// True for a source model branch emptied by a reduction
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::SourceModel(fnames) if fnames.is_empty())
    }

    /// Whether this payload can belong to a branchset of type `utype`
    pub fn fits(&self, utype: UncertaintyType) -> bool {
        use UncertaintyType as U;
        match self {
            Self::SourceModel(_) => utype.is_source_model(),
            Self::Gsim(_) => utype == U::GmpeModel,
            Self::Float(_) => matches!(
                utype,
                U::MaxMagGrRelative
                    | U::BGrRelative
                    | U::MaxMagGrAbsolute
                    | U::SimpleFaultDipRelative
                    | U::SimpleFaultDipAbsolute
            ),
            Self::AbGr { .. } => utype == U::AbGrAbsolute,
            Self::IncrementalMfd { .. } => utype == U::IncrementalMfdAbsolute,
            Self::SlipRate { .. } => utype == U::TruncatedGrFromSlipAbsolute,
            Self::SimpleFault(_) => utype == U::SimpleFaultGeometryAbsolute,
            Self::ComplexFault(_) => utype == U::ComplexFaultGeometryAbsolute,
            Self::Characteristic(_) => utype == U::CharacteristicFaultGeometryAbsolute,
        }
    }

    /// Canonical JSON text, used as the `uvalue` column
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Inverse of [`Uncertainty::to_json`], checked against the type
    pub fn from_json(utype: UncertaintyType, text: &str) -> Result<Self> {
        let value: Self = serde_json::from_str(text)?;
        if value.fits(utype) {
            Ok(value)
        } else {
            Err(LogicTreeError::value(format!("{text} is not a valid {utype} value")))
        }
    }
}

impl fmt::Display for Uncertainty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceModel(fnames) => f.write_str(&fnames.join(" ")),
            Self::Gsim(gsim) => write!(f, "{gsim}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::AbGr { a, b } => write!(f, "{a} {b}"),
            Self::IncrementalMfd { min_mag, bin_width, occur_rates } => {
                write!(f, "{min_mag} {bin_width} {occur_rates:?}")
            }
            Self::SlipRate { slip_rate, rigidity } => write!(f, "{slip_rate} {rigidity}"),
            other => write!(f, "{other:?}"),
        }
    }
}

// ─────────────────────────────────────────────
// 3. Parsing
// ─────────────────────────────────────────────

fn float(text: &str, node: &Node, filename: &str, msg: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| LogicTreeError::logic(node, filename, msg))
}

fn attr_f64(node: &Node, key: &str, filename: &str) -> Result<f64> {
    let value = node
        .get(key)
        .ok_or_else(|| LogicTreeError::logic(node, filename, format!("missing attribute {key}")))?;
    float(value, node, filename, &format!("attribute {key} must be a float"))
}

fn child_f64(node: &Node, tag: &str, filename: &str) -> Result<f64> {
    let child = node
        .child(tag)
        .ok_or_else(|| LogicTreeError::logic(node, filename, format!("missing {tag} node")))?;
    float(child.text_trim(), child, filename, &format!("{tag} must be a float"))
}

fn floats(text: &str) -> Option<Vec<f64>> {
    text.split_whitespace().map(|s| s.parse::<f64>().ok()).collect()
}

fn pos_list(node: &Node) -> Option<&str> {
    Some(node.child("LineString")?.child("posList")?.text_trim())
}

fn coords_2d(text: &str) -> Option<Vec<(f64, f64)>> {
    let xs = floats(text)?;
    if xs.is_empty() || xs.len() % 2 != 0 {
        return None;
    }
    Some(xs.chunks(2).map(|c| (c[0], c[1])).collect())
}

fn coords_3d(text: &str) -> Option<Vec<(f64, f64, f64)>> {
    let xs = floats(text)?;
    if xs.is_empty() || xs.len() % 3 != 0 {
        return None;
    }
    Some(xs.chunks(3).map(|c| (c[0], c[1], c[2])).collect())
}

/// Parse the `uncertaintyModel` node of a branch according to `utype`.
pub fn parse_uncertainty(utype: UncertaintyType, node: &Node, filename: &str) -> Result<Uncertainty> {
    use UncertaintyType as U;
    let single = "expected single float value";
    match utype {
        U::SourceModel | U::ExtendModel => Ok(Uncertainty::SourceModel(
            node.text_trim().split_whitespace().map(str::to_string).collect(),
        )),
        U::GmpeModel => Ok(Uncertainty::Gsim(
            node.text_trim()
                .parse::<Gsim>()
                .map_err(|e| LogicTreeError::logic(node, filename, e.to_string()))?,
        )),
        U::MaxMagGrRelative
        | U::BGrRelative
        | U::MaxMagGrAbsolute
        | U::SimpleFaultDipRelative
        | U::SimpleFaultDipAbsolute => Ok(Uncertainty::Float(float(node.text_trim(), node, filename, single)?)),
        U::AbGrAbsolute => {
            let msg = "expected a pair of floats separated by space";
            match floats(node.text_trim()).as_deref() {
                Some([a, b]) => Ok(Uncertainty::AbGr { a: *a, b: *b }),
                _ => Err(LogicTreeError::logic(node, filename, msg)),
            }
        }
        U::IncrementalMfdAbsolute => {
            let mfd = node.child("incrementalMFD").ok_or_else(|| {
                LogicTreeError::logic(node, filename, "missing incrementalMFD node")
            })?;
            let rates = mfd
                .child("occurRates")
                .and_then(|n| floats(n.text_trim()))
                .ok_or_else(|| LogicTreeError::logic(mfd, filename, "invalid occurRates"))?;
            Ok(Uncertainty::IncrementalMfd {
                min_mag: attr_f64(mfd, "minMag", filename)?,
                bin_width: attr_f64(mfd, "binWidth", filename)?,
                occur_rates: rates,
            })
        }
        U::TruncatedGrFromSlipAbsolute => {
            let data = node.child("faultActivityData").ok_or_else(|| {
                LogicTreeError::logic(node, filename, "missing faultActivityData node")
            })?;
            Ok(Uncertainty::SlipRate {
                slip_rate: attr_f64(data, "slipRate", filename)?,
                rigidity: attr_f64(data, "rigidity", filename)?,
            })
        }
        U::SimpleFaultGeometryAbsolute => {
            let geom = node.child("simpleFaultGeometry").unwrap_or(node);
            Ok(Uncertainty::SimpleFault(simple_geometry(geom, filename)?))
        }
        U::ComplexFaultGeometryAbsolute => {
            let geom = node.child("complexFaultGeometry").unwrap_or(node);
            Ok(Uncertainty::ComplexFault(complex_geometry(geom, filename)?))
        }
        U::CharacteristicFaultGeometryAbsolute => {
            let surface = node
                .child("surface")
                .ok_or_else(|| LogicTreeError::logic(node, filename, "missing surface node"))?;
            let mut surfaces = Vec::with_capacity(surface.len());
            for geom in &surface.nodes {
                surfaces.push(match geom.tag.as_str() {
                    "simpleFaultGeometry" => FaultSurface::Simple(simple_geometry(geom, filename)?),
                    "complexFaultGeometry" => FaultSurface::Complex(complex_geometry(geom, filename)?),
                    "planarSurface" => FaultSurface::Planar(planar_surface(geom, filename)?),
                    _ => {
                        return Err(LogicTreeError::logic(
                            geom,
                            filename,
                            "Surface geometry type not recognised",
                        ))
                    }
                });
            }
            if surfaces.is_empty() {
                return Err(LogicTreeError::logic(surface, filename, "empty surface node"));
            }
            Ok(Uncertainty::Characteristic(surfaces))
        }
    }
}

// ─────────────────────────────────────────────
// 4. Geometry validation
// ─────────────────────────────────────────────

fn simple_geometry(node: &Node, filename: &str) -> Result<SimpleFaultGeometry> {
    let trace = pos_list(node)
        .and_then(coords_2d)
        .ok_or_else(|| LogicTreeError::logic(node, filename, "'simpleFaultGeometry' node is not valid"))?;
    Ok(SimpleFaultGeometry {
        trace,
        upper_seismo_depth: child_f64(node, "upperSeismoDepth", filename)?,
        lower_seismo_depth: child_f64(node, "lowerSeismoDepth", filename)?,
        dip: child_f64(node, "dip", filename)?,
        spacing: attr_f64(node, "spacing", filename)?,
    })
}

fn complex_geometry(node: &Node, filename: &str) -> Result<ComplexFaultGeometry> {
    let invalid = || LogicTreeError::logic(node, filename, "'complexFaultGeometry' node is not valid");
    let spacing = node.get("spacing").and_then(|s| s.trim().parse::<f64>().ok());
    let edges: Option<Vec<_>> = node
        .nodes
        .iter()
        .map(|edge| pos_list(edge).and_then(coords_3d))
        .collect();
    match (spacing, edges) {
        (Some(spacing), Some(edges)) if spacing != 0.0 && !edges.is_empty() => {
            Ok(ComplexFaultGeometry { edges, spacing })
        }
        _ => Err(invalid()),
    }
}

const CORNERS: [&str; 4] = ["topLeft", "topRight", "bottomRight", "bottomLeft"];

fn planar_surface(node: &Node, filename: &str) -> Result<PlanarSurface> {
    let invalid = || LogicTreeError::logic(node, filename, "'planarFaultGeometry' node is not valid");
    let spacing = node
        .get("spacing")
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|s| *s != 0.0)
        .ok_or_else(invalid)?;
    let mut corners = [(0.0, 0.0, 0.0); 4];
    for (corner, key) in corners.iter_mut().zip(CORNERS) {
        let point = node.child(key).ok_or_else(invalid)?;
        let lon = attr_f64(point, "lon", filename)?;
        let lat = attr_f64(point, "lat", filename)?;
        let depth = attr_f64(point, "depth", filename)?;
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) || depth < 0.0 {
            return Err(invalid());
        }
        *corner = (lon, lat, depth);
    }
    Ok(PlanarSurface { corners, spacing })
}

// ─────────────────────────────────────────────
// 5. Node output
// ─────────────────────────────────────────────

fn pos_list_node(text: String) -> Node {
    Node::new("gml:LineString").with_node(Node::new("gml:posList").with_text(text))
}

fn simple_node(g: &SimpleFaultGeometry) -> Node {
    let coords: Vec<String> = g.trace.iter().map(|(x, y)| format!("{x} {y}")).collect();
    Node::new("simpleFaultGeometry")
        .with_attr("spacing", g.spacing.to_string())
        .with_node(pos_list_node(coords.join(" ")))
        .with_node(Node::new("dip").with_text(g.dip.to_string()))
        .with_node(Node::new("upperSeismoDepth").with_text(g.upper_seismo_depth.to_string()))
        .with_node(Node::new("lowerSeismoDepth").with_text(g.lower_seismo_depth.to_string()))
}

fn complex_node(g: &ComplexFaultGeometry) -> Node {
    let last = g.edges.len().saturating_sub(1);
    let edges = g.edges.iter().enumerate().map(|(i, edge)| {
        let tag = match i {
            0 => "faultTopEdge",
            i if i == last => "faultBottomEdge",
            _ => "intermediateEdge",
        };
        let coords: Vec<String> = edge.iter().map(|(x, y, z)| format!("{x} {y} {z}")).collect();
        Node::new(tag).with_node(pos_list_node(coords.join(" ")))
    });
    Node::new("complexFaultGeometry")
        .with_attr("spacing", g.spacing.to_string())
        .with_nodes(edges)
}

fn planar_node(p: &PlanarSurface) -> Node {
    let corners = p.corners.iter().zip(CORNERS).map(|((lon, lat, depth), key)| {
        Node::new(key)
            .with_attr("lon", lon.to_string())
            .with_attr("lat", lat.to_string())
            .with_attr("depth", depth.to_string())
    });
    Node::new("planarSurface")
        .with_attr("spacing", p.spacing.to_string())
        .with_nodes(corners)
}

impl Uncertainty {
    /// The `uncertaintyModel` node describing this payload
    pub fn to_node(&self) -> Node {
        let um = Node::new("uncertaintyModel");
        match self {
            Self::SourceModel(_) | Self::Gsim(_) | Self::Float(_) | Self::AbGr { .. } => {
                um.with_text(self.to_string())
            }
            Self::IncrementalMfd { min_mag, bin_width, occur_rates } => {
                let rates: Vec<String> = occur_rates.iter().map(f64::to_string).collect();
                um.with_node(
                    Node::new("incrementalMFD")
                        .with_attr("minMag", min_mag.to_string())
                        .with_attr("binWidth", bin_width.to_string())
                        .with_node(Node::new("occurRates").with_text(rates.join(" "))),
                )
            }
            Self::SlipRate { slip_rate, rigidity } => um.with_node(
                Node::new("faultActivityData")
                    .with_attr("slipRate", slip_rate.to_string())
                    .with_attr("rigidity", rigidity.to_string()),
            ),
            Self::SimpleFault(g) => um.with_node(simple_node(g)),
            Self::ComplexFault(g) => um.with_node(complex_node(g)),
            Self::Characteristic(surfaces) => um.with_node(Node::new("surface").with_nodes(
                surfaces.iter().map(|s| match s {
                    FaultSurface::Simple(g) => simple_node(g),
                    FaultSurface::Complex(g) => complex_node(g),
                    FaultSurface::Planar(p) => planar_node(p),
                }),
            )),
        }
    }
}
