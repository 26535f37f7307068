//! Unit tests for SourceRef and SourceCode

use core_types::{ScriptId, SourceCode, SourceRef};

#[cfg(test)]
mod source_ref_tests {
    use super::*;

    #[test]
    fn test_distance_prefers_same_line() {
        let on_line = SourceRef::new(0, 10, 30, 10, 40);
        let next_line = SourceRef::new(0, 11, 1, 11, 5);

        // Column 1 on line 10 is 29 columns away from the first ref, but a
        // whole line away from the second.
        assert_eq!(on_line.get_location_distance(0, 10, 1), 29);
        assert_eq!(next_line.get_location_distance(0, 10, 1), 1600);
    }

    #[test]
    fn test_distance_inside_multiline_span_is_zero() {
        let sref = SourceRef::new(0, 2, 1, 6, 3);
        assert_eq!(sref.get_location_distance(0, 4, 99), 0);
        assert_eq!(sref.get_location_distance(0, 8, 1), 3200);
        assert_eq!(sref.get_location_distance(0, 1, 1), 1600);
    }

    #[test]
    fn test_non_breakable_clears_step_stop() {
        let sref = SourceRef::new(0, 1, 1, 1, 1).non_breakable();
        assert!(sref.cannot_breakpoint);
        assert!(!sref.is_step_stop);
    }

    #[test]
    fn test_host_location() {
        let sref = SourceRef::host_location();
        assert!(sref.is_host_location());
        assert!(!sref.includes_location(0, 0, 0));
    }
}

#[cfg(test)]
mod source_code_tests {
    use super::*;

    fn sample() -> SourceCode {
        SourceCode {
            id: 0,
            name: "chunk_0".to_string(),
            code: "local a = 1\nprint(a)\n".to_string(),
            owner: ScriptId::next(),
            refs: vec![
                SourceRef::new(0, 1, 1, 1, 11),
                SourceRef::new(0, 2, 1, 2, 8),
                SourceRef::new(0, 2, 1, 2, 8).non_breakable(),
            ],
        }
    }

    #[test]
    fn test_line_access_is_one_based() {
        let src = sample();
        assert_eq!(src.line(1), Some("local a = 1"));
        assert_eq!(src.line(2), Some("print(a)"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(3), None);
    }

    #[test]
    fn test_breakable_refs_on_line() {
        let src = sample();
        assert_eq!(src.breakable_refs_on_line(2).count(), 1);
        assert_eq!(src.breakable_refs_on_line(5).count(), 0);
    }
}
