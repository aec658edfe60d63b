use serde::{Deserialize, Serialize};

use crate::status::{Result, Status};

/// Element datatypes the interpreter understands. The set is closed: the
/// serialized model carries one of these tags per tensor and dispatch
/// branches on it at execute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    I8,
    I16,
    I32,
    I64,
    Bool,
}

impl DType {
    pub fn from_tag(tag: u8) -> Option<DType> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::I8),
            2 => Some(DType::I16),
            3 => Some(DType::I32),
            4 => Some(DType::I64),
            5 => Some(DType::Bool),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            DType::F32 => 0,
            DType::I8 => 1,
            DType::I16 => 2,
            DType::I32 => 3,
            DType::I64 => 4,
            DType::Bool => 5,
        }
    }

    /// Size of one element in bytes. Bool is stored as one byte, 0 or 1.
    pub fn size(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::I8 | DType::Bool => 1,
            DType::I16 => 2,
            DType::I64 => 8,
        }
    }

    /// Datatypes that carry a quantization descriptor when quantized.
    pub fn is_quantizable(self) -> bool {
        matches!(self, DType::I8 | DType::I16)
    }
}

/// Fused activation applied after an operator's accumulation.
/// Tag order matches the wire schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationKind {
    None,
    Relu,
    ReluN1To1,
    Relu6,
}

impl ActivationKind {
    pub fn from_tag(tag: u8) -> Option<ActivationKind> {
        match tag {
            0 => Some(ActivationKind::None),
            1 => Some(ActivationKind::Relu),
            2 => Some(ActivationKind::ReluN1To1),
            3 => Some(ActivationKind::Relu6),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            ActivationKind::None => 0,
            ActivationKind::Relu => 1,
            ActivationKind::ReluN1To1 => 2,
            ActivationKind::Relu6 => 3,
        }
    }
}

/// Quantization descriptor: real value = (stored - zero_point) * scale.
/// Per-channel quantization carries one scale/zero-point pair per slice
/// along `axis`; per-tensor quantization uses a single pair and no axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scales: Vec<f32>,
    pub zero_points: Vec<i32>,
    pub axis: Option<usize>,
}

impl QuantParams {
    pub fn per_tensor(scale: f32, zero_point: i32) -> Self {
        Self {
            scales: vec![scale],
            zero_points: vec![zero_point],
            axis: None,
        }
    }

    pub fn scale(&self) -> Result<f32> {
        self.scales
            .first()
            .copied()
            .ok_or_else(|| Status::invalid_model("quantization descriptor without scales"))
    }

    pub fn zero_point(&self) -> Result<i32> {
        self.zero_points
            .first()
            .copied()
            .ok_or_else(|| Status::invalid_model("quantization descriptor without zero points"))
    }
}
