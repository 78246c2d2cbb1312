// SPDX-License-Identifier: BSD-3-Clause
//! What a capacity bound measures.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// The bound is the size in bytes.
    ByteCount,
    /// The bound is the number of elements.
    ElemCount,
    /// The bound is the index of the last element (count - 1).
    ElemLast,
    /// Elements already consumed, as in `buf[len++] = c`.
    UsedCount,
    /// Index of the last consumed element, as in `buf[++last] = c`.
    UsedLast,
}

pub const ALL: [LimitKind; 5] = [
    LimitKind::ByteCount,
    LimitKind::ElemCount,
    LimitKind::ElemLast,
    LimitKind::UsedCount,
    LimitKind::UsedLast,
];

impl LimitKind {
    pub fn name(self) -> &'static str {
        match self {
            LimitKind::ByteCount => "byte_count",
            LimitKind::ElemCount => "elem_count",
            LimitKind::ElemLast => "elem_last",
            LimitKind::UsedCount => "used_count",
            LimitKind::UsedLast => "used_last",
        }
    }

    /// Stable code used in persisted rows.
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        ALL.get(code as usize).copied()
    }

    /// Kinds that cross a function boundary are always the element kinds.
    pub fn normalized(self) -> Self {
        match self {
            LimitKind::UsedCount => LimitKind::ElemCount,
            LimitKind::UsedLast => LimitKind::ElemLast,
            k => k,
        }
    }
}

impl Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown limit kind: {0}")]
pub struct ParseLimitError(pub String);

impl FromStr for LimitKind {
    type Err = ParseLimitError;

    /// Accepts the numeric code or the name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<u32>() {
            return LimitKind::from_code(code).ok_or_else(|| ParseLimitError(s.to_string()));
        }
        ALL.into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| ParseLimitError(s.to_string()))
    }
}

/// How a summarized parameter's capacity relates to the other arguments.
/// The ±1 and element-size adjustments are folded into the limit kind.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Relation {
    EqualsParam(usize),
}

impl Relation {
    const EQUALS_PARAM: &'static str = "==$";

    pub fn parse(key: &str) -> Option<Self> {
        key.strip_prefix(Self::EQUALS_PARAM)
            .and_then(|n| n.parse::<usize>().ok())
            .map(Relation::EqualsParam)
    }

    pub fn key(&self) -> String {
        match self {
            Relation::EqualsParam(n) => format!("{}{}", Self::EQUALS_PARAM, n),
        }
    }
}
