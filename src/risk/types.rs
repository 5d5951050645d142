// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Risk assessment types

use serde::Serialize;

use crate::config::Tier;

/// Risk score in `[0, max_risk]` (10 with the default configuration)
pub type RiskScore = u32;

/// One pattern that matched a command
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PatternMatch {
    /// Severity tier of the matched pattern
    pub tier: Tier,
    /// The configured signature that matched
    pub signature: String,
}

/// Full risk assessment of a single command
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskAssessment {
    /// Capped sum of tier weights over matched patterns
    pub score: RiskScore,
    /// At least one CRITICAL pattern matched
    pub critical: bool,
    /// At least one HIGH pattern matched
    pub high: bool,
    /// Every matched pattern, most severe first
    pub matches: Vec<PatternMatch>,
}

impl RiskAssessment {
    /// Most severe tier that matched, if any
    pub fn highest_tier(&self) -> Option<Tier> {
        self.matches.iter().map(|m| m.tier).max()
    }

    /// Number of CRITICAL and HIGH patterns that matched
    pub fn vulnerability_count(&self) -> usize {
        self.matches.iter().filter(|m| m.tier.is_vulnerability()).count()
    }

    /// True when neither a CRITICAL nor a HIGH pattern matched
    pub fn is_secure(&self) -> bool {
        !self.critical && !self.high
    }
}
