// 🔑 Deterministic Identifier Generator
//
// A tuition's id is a CONTENT KEY, not an assigned identity:
//   SHA-256("{subject}:{system}:{slot}:{teacher}:{student,student,...}")[..16]
//
// Identical attributes always hash to the identical id, so a catalog rebuild
// re-creates the same ids and side data can be re-attached by id.
// Truncated digest: fine as a lookup key, never as a security token.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Field delimiter of the canonical string
const DELIMITER: char = ':';

/// Delimiter between student ids inside the last field
const STUDENT_DELIMITER: char = ',';

/// Build the canonical string hashed by [`tuition_id`].
///
/// Student ids are deduplicated and sorted ascending first, so input order never
/// changes the result.
pub fn canonical_string(
    subject: &str,
    educational_system: &str,
    lesson_index: u32,
    teacher_id: Uuid,
    student_ids: &[Uuid],
) -> String {
    let mut students = student_ids.to_vec();
    students.sort();
    students.dedup();

    let joined = students
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(&STUDENT_DELIMITER.to_string());

    format!(
        "{subject}{d}{educational_system}{d}{lesson_index}{d}{teacher_id}{d}{joined}",
        d = DELIMITER
    )
}

/// Derive the stable 128-bit id of a tuition slot
pub fn tuition_id(
    subject: &str,
    educational_system: &str,
    lesson_index: u32,
    teacher_id: Uuid,
    student_ids: &[Uuid],
) -> Uuid {
    let canonical = canonical_string(
        subject,
        educational_system,
        lesson_index,
        teacher_id,
        student_ids,
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: u128) -> Vec<Uuid> {
        (1..=n).map(Uuid::from_u128).collect()
    }

    #[test]
    fn test_canonical_string_layout() {
        let teacher = Uuid::from_u128(0xAA);
        let s = canonical_string("Math", "IGCSE", 2, teacher, &[Uuid::from_u128(2), Uuid::from_u128(1)]);

        assert_eq!(
            s,
            format!(
                "Math:IGCSE:2:{}:{},{}",
                teacher,
                Uuid::from_u128(1),
                Uuid::from_u128(2)
            )
        );
    }

    #[test]
    fn test_same_inputs_same_id() {
        let teacher = Uuid::from_u128(7);
        let a = tuition_id("Physics", "National", 1, teacher, &ids(3));
        let b = tuition_id("Physics", "National", 1, teacher, &ids(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let teacher = Uuid::from_u128(7);
        let s1 = Uuid::from_u128(1);
        let s2 = Uuid::from_u128(2);

        assert_eq!(
            tuition_id("Math", "IGCSE", 1, teacher, &[s1, s2]),
            tuition_id("Math", "IGCSE", 1, teacher, &[s2, s1, s1])
        );
    }

    #[test]
    fn test_every_attribute_changes_the_id() {
        let teacher = Uuid::from_u128(7);
        let base = tuition_id("Math", "IGCSE", 1, teacher, &ids(2));

        assert_ne!(base, tuition_id("Physics", "IGCSE", 1, teacher, &ids(2)));
        assert_ne!(base, tuition_id("Math", "National", 1, teacher, &ids(2)));
        assert_ne!(base, tuition_id("Math", "IGCSE", 2, teacher, &ids(2)));
        assert_ne!(base, tuition_id("Math", "IGCSE", 1, Uuid::from_u128(8), &ids(2)));
        assert_ne!(base, tuition_id("Math", "IGCSE", 1, teacher, &ids(3)));
    }

    #[test]
    fn test_id_is_digest_prefix() {
        let teacher = Uuid::from_u128(7);
        let canonical = canonical_string("Math", "IGCSE", 1, teacher, &ids(1));
        let digest = Sha256::digest(canonical.as_bytes());

        let id = tuition_id("Math", "IGCSE", 1, teacher, &ids(1));
        assert_eq!(id.as_bytes(), &digest[..16]);
    }

    proptest! {
        #[test]
        fn prop_student_order_never_matters(
            raw in proptest::collection::vec(any::<u128>(), 1..8),
            seed in any::<u64>(),
        ) {
            let students: Vec<Uuid> = raw.iter().copied().map(Uuid::from_u128).collect();

            let mut shuffled = students.clone();
            // deterministic rotation + reversal stands in for a permutation
            let k = (seed as usize) % shuffled.len();
            shuffled.rotate_left(k);
            if seed % 2 == 0 {
                shuffled.reverse();
            }

            let teacher = Uuid::from_u128(99);
            prop_assert_eq!(
                tuition_id("Math", "IGCSE", 1, teacher, &students),
                tuition_id("Math", "IGCSE", 1, teacher, &shuffled)
            );
        }
    }
}
