use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

use crate::mapping;

/// Caller-side input problems, detected before any browser is started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("product type must not be empty")]
    EmptyProductType,
    #[error("unsupported width `{0}`")]
    UnsupportedWidth(String),
    #[error("unsupported depth `{0}`")]
    UnsupportedDepth(String),
    #[error("{0} filter has no option position for the requested value")]
    UnmappedPosition(Dimension),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Width,
    Depth,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Width => f.write_str("width"),
            Dimension::Depth => f.write_str("depth"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Cm50,
    Cm100,
}

impl Width {
    pub const ALL: [Width; 2] = [Width::Cm50, Width::Cm100];

    pub fn as_str(self) -> &'static str {
        match self {
            Width::Cm50 => "50",
            Width::Cm100 => "100",
        }
    }

    /// Option position inside the width filter panel.
    pub fn position(self) -> u32 {
        mapping::map_width(self.as_str())
    }
}

impl FromStr for Width {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || InputError::UnsupportedWidth(s.to_string());
        if !mapping::is_valid_width(s) {
            return Err(unsupported());
        }
        Width::ALL
            .into_iter()
            .find(|width| width.as_str() == s)
            .ok_or_else(unsupported)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth {
    Cm30,
    Cm60,
}

impl Depth {
    pub const ALL: [Depth; 2] = [Depth::Cm30, Depth::Cm60];

    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Cm30 => "30",
            Depth::Cm60 => "60",
        }
    }

    /// Option position inside the depth filter panel.
    pub fn position(self) -> u32 {
        mapping::map_depth(self.as_str())
    }
}

impl FromStr for Depth {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || InputError::UnsupportedDepth(s.to_string());
        if !mapping::is_valid_depth(s) {
            return Err(unsupported());
        }
        Depth::ALL
            .into_iter()
            .find(|depth| depth.as_str() == s)
            .ok_or_else(unsupported)
    }
}

/// A validated scrape request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub product_type: String,
    pub width: Width,
    pub depth: Depth,
}

impl ScrapeRequest {
    pub fn parse(product_type: &str, width: &str, depth: &str) -> Result<Self, InputError> {
        let product_type = product_type.trim();
        if product_type.is_empty() {
            return Err(InputError::EmptyProductType);
        }

        Ok(Self {
            product_type: product_type.to_string(),
            width: width.parse()?,
            depth: depth.parse()?,
        })
    }
}

/// One entry of the filtered result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub title: Option<String>,
    pub price: f64,
    /// Absolute URL of the offer page.
    pub link: Option<String>,
}
