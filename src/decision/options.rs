//! Decide options (spec §6): explicit bit flags replace the original's
//! dynamic keyword-argument options bag (Design Notes §9).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DecideOptions: u8 {
        /// Bypass user-profile lookup/save entirely (spec §4.5 step 6).
        const IGNORE_USER_PROFILE_SERVICE = 0b0000_0001;
        /// Populate `Decision.reasons` at every pipeline step (spec §4.5).
        const INCLUDE_REASONS             = 0b0000_0010;
        /// Caller-side hint to suppress impression emission.
        const DISABLE_DECISION_EVENT      = 0b0000_0100;
        /// Filter multi-flag decide results to enabled flags only.
        const ENABLED_FLAGS_ONLY          = 0b0000_1000;
        /// Elide variable values from the returned decision.
        const EXCLUDE_VARIABLES           = 0b0001_0000;
    }
}

impl DecideOptions {
    pub fn include_reasons(self) -> bool {
        self.contains(DecideOptions::INCLUDE_REASONS)
    }

    pub fn ignore_user_profile_service(self) -> bool {
        self.contains(DecideOptions::IGNORE_USER_PROFILE_SERVICE)
    }
}

/// `fetchQualifiedSegments` options (spec §4.8), kept separate from
/// `DecideOptions` since they govern a different subsystem.
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SegmentOptions: u8 {
        const IGNORE_CACHE = 0b0000_0001;
        const RESET_CACHE  = 0b0000_0010;
    }
}

#[cfg(test)]
mod options_tests {
    use super::*;

    #[test]
    fn default_options_are_empty() {
        assert!(DecideOptions::default().is_empty());
    }

    #[test]
    fn include_reasons_flag_detected() {
        let options = DecideOptions::INCLUDE_REASONS | DecideOptions::IGNORE_USER_PROFILE_SERVICE;
        assert!(options.include_reasons());
        assert!(options.ignore_user_profile_service());
        assert!(!options.contains(DecideOptions::DISABLE_DECISION_EVENT));
    }

    #[test]
    fn segment_options_combine() {
        let options = SegmentOptions::IGNORE_CACHE | SegmentOptions::RESET_CACHE;
        assert!(options.contains(SegmentOptions::IGNORE_CACHE));
        assert!(options.contains(SegmentOptions::RESET_CACHE));
    }
}
