//! Context budgeting: fit named prompt blocks under a size ceiling.
//!
//! Blocks are shrunk in two passes, lowest priority first (ties: larger
//! block first):
//!
//! 1. **Truncatable** blocks keep their head and tail around a truncation
//!    marker. A block too small to keep [`min_truncated_chars`] next to the
//!    marker is dropped instead.
//! 2. **Droppable** blocks are removed whole, as a last resort.
//!
//! Pinned blocks (neither truncatable nor droppable) are never touched. When
//! only pinned blocks are left and the total still exceeds the ceiling, the
//! outcome carries a [`BudgetViolation`]; that is a warning, not a failure.
//!
//! [`min_truncated_chars`]: ContextBudgeter::with_min_truncated_chars

use std::collections::BTreeMap;

use rustscout_config::BudgetUnit;
use rustscout_core::truncate::squeeze;
use serde::{Deserialize, Serialize};

use crate::context::token;

pub const DEFAULT_MIN_TRUNCATED_CHARS: usize = 64;

// ── Types ─────────────────────────────────────────────────────────────────

/// One named piece of prompt material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlock {
    pub name: String,
    pub text: String,
    /// Higher survives longer
    pub priority: u8,
    pub truncatable: bool,
    pub droppable: bool,
}

impl ContextBlock {
    /// A block that is never shrunk.
    pub fn pinned(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            priority: u8::MAX,
            truncatable: false,
            droppable: false,
        }
    }

    pub fn truncatable(name: impl Into<String>, text: impl Into<String>, priority: u8) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            priority,
            truncatable: true,
            droppable: false,
        }
    }

    pub fn droppable(name: impl Into<String>, text: impl Into<String>, priority: u8) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            priority,
            truncatable: false,
            droppable: true,
        }
    }

    pub fn is_pinned(&self) -> bool {
        !self.truncatable && !self.droppable
    }
}

/// What happened to a block during fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BlockStatus {
    Kept,
    Truncated { from: usize, to: usize },
    Dropped { size: usize },
}

/// Per-block statistics for one fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStats {
    pub name: String,
    /// Final size (0 when dropped)
    pub size: usize,
    #[serde(flatten)]
    pub status: BlockStatus,
}

/// Pinned blocks alone exceed the ceiling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("Budget exceeded: {total} > {ceiling} with only pinned blocks left ({})", pinned.join(", "))]
pub struct BudgetViolation {
    pub total: usize,
    pub ceiling: usize,
    pub pinned: Vec<String>,
}

/// Result of fitting blocks to a ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetOutcome {
    /// Surviving blocks in input order
    pub blocks: Vec<(String, String)>,
    /// Statistics for every input block, in input order
    pub stats: Vec<BlockStats>,
    pub total: usize,
    pub ceiling: usize,
    /// `total / ceiling` as a percentage
    pub utilization_pct: f32,
    pub violation: Option<BudgetViolation>,
}

impl BudgetOutcome {
    /// Text of a surviving block.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.blocks
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.as_str())
    }

    pub fn status(&self, name: &str) -> Option<BlockStatus> {
        self.stats.iter().find(|s| s.name == name).map(|s| s.status)
    }

    pub fn dropped(&self) -> Vec<&str> {
        self.stats
            .iter()
            .filter(|s| matches!(s.status, BlockStatus::Dropped { .. }))
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn truncated(&self) -> Vec<&str> {
        self.stats
            .iter()
            .filter(|s| matches!(s.status, BlockStatus::Truncated { .. }))
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// A whole-prompt budget: the context window minus fixed reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBudget {
    pub ceiling: usize,
    pub reserved: BTreeMap<String, usize>,
}

impl PromptBudget {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            reserved: BTreeMap::new(),
        }
    }

    pub fn reserve(mut self, name: impl Into<String>, size: usize) -> Self {
        *self.reserved.entry(name.into()).or_default() += size;
        self
    }

    pub fn reserved_total(&self) -> usize {
        self.reserved.values().sum()
    }

    /// Room left after every reservation, saturating at zero.
    pub fn available_for_context(&self) -> usize {
        self.ceiling.saturating_sub(self.reserved_total())
    }
}

// ── Budgeter ──────────────────────────────────────────────────────────────

/// Fits blocks to a ceiling. Stateless; create one and reuse it.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudgeter {
    unit: BudgetUnit,
    min_truncated_chars: usize,
}

impl Default for ContextBudgeter {
    fn default() -> Self {
        Self::new(BudgetUnit::default())
    }
}

impl ContextBudgeter {
    pub fn new(unit: BudgetUnit) -> Self {
        Self {
            unit,
            min_truncated_chars: DEFAULT_MIN_TRUNCATED_CHARS,
        }
    }

    pub fn with_min_truncated_chars(mut self, min: usize) -> Self {
        self.min_truncated_chars = min;
        self
    }

    pub fn unit(&self) -> BudgetUnit {
        self.unit
    }

    pub fn measure(&self, text: &str) -> usize {
        token::measure(text, self.unit)
    }

    /// Fit `blocks` under `ceiling` (measured in this budgeter's unit).
    pub fn fit(&self, blocks: Vec<ContextBlock>, ceiling: usize) -> BudgetOutcome {
        let original: Vec<usize> = blocks.iter().map(|b| self.measure(&b.text)).collect();
        let mut sizes = original.clone();
        let mut texts: Vec<Option<String>> = blocks.iter().map(|b| Some(b.text.clone())).collect();
        let mut total: usize = sizes.iter().sum();

        let mut order: Vec<usize> = (0..blocks.len()).collect();
        order.sort_by(|&a, &b| {
            blocks[a]
                .priority
                .cmp(&blocks[b].priority)
                .then(original[b].cmp(&original[a]))
        });

        for &i in order.iter().filter(|&&i| blocks[i].truncatable) {
            if total <= ceiling {
                break;
            }
            let excess = total - ceiling;
            let target = sizes[i].saturating_sub(excess);
            let squeezed = (target > 0)
                .then(|| {
                    squeeze(
                        &blocks[i].text,
                        token::chars_within(target, self.unit),
                        self.min_truncated_chars,
                    )
                })
                .flatten();

            total -= sizes[i];
            match squeezed {
                Some(text) => {
                    sizes[i] = self.measure(&text);
                    total += sizes[i];
                    texts[i] = Some(text);
                }
                None => {
                    sizes[i] = 0;
                    texts[i] = None;
                }
            }
        }

        for &i in order
            .iter()
            .filter(|&&i| !blocks[i].truncatable && blocks[i].droppable)
        {
            if total <= ceiling {
                break;
            }
            total -= sizes[i];
            sizes[i] = 0;
            texts[i] = None;
        }

        let violation = (total > ceiling).then(|| BudgetViolation {
            total,
            ceiling,
            pinned: blocks
                .iter()
                .zip(&texts)
                .filter(|(_, t)| t.is_some())
                .map(|(b, _)| b.name.clone())
                .collect(),
        });

        let stats = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let status = match &texts[i] {
                    None => BlockStatus::Dropped { size: original[i] },
                    Some(t) if *t != b.text => BlockStatus::Truncated {
                        from: original[i],
                        to: sizes[i],
                    },
                    Some(_) => BlockStatus::Kept,
                };
                BlockStats {
                    name: b.name.clone(),
                    size: sizes[i],
                    status,
                }
            })
            .collect();

        let survivors = blocks
            .into_iter()
            .zip(texts)
            .filter_map(|(b, t)| t.map(|t| (b.name, t)))
            .collect();

        BudgetOutcome {
            blocks: survivors,
            stats,
            total,
            ceiling,
            utilization_pct: if ceiling == 0 {
                if total == 0 { 0.0 } else { 100.0 }
            } else {
                (total as f32 / ceiling as f32) * 100.0
            },
            violation,
        }
    }
}
