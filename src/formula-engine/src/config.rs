use formula_types::LegacyApprovalProbe;

/// Per-call analyzer options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Return the empty report (plus execution record) as soon as the Formula is found executed.
    pub stop_on_already_executed: bool,
    /// Tried in order when an ERC721 contract lacks `getApproved`.
    pub legacy_erc721_probes: Vec<LegacyApprovalProbe>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            stop_on_already_executed: false,
            legacy_erc721_probes: vec![LegacyApprovalProbe::crypto_kitties()],
        }
    }
}

impl AnalyzerConfig {
    pub fn stop_on_already_executed(mut self, stop: bool) -> Self {
        self.stop_on_already_executed = stop;
        self
    }

    pub fn legacy_erc721_probes(mut self, probes: Vec<LegacyApprovalProbe>) -> Self {
        self.legacy_erc721_probes = probes;
        self
    }
}
