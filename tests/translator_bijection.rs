//! Property test (spec §8 "Translator bijection"): after any sequence of
//! insert/delete/remap operations, iterating the external->internal map
//! and the internal->external map yield the same underlying set of pairs.

use proptest::prelude::*;
use vsearch::IdTranslator;

#[derive(Debug, Clone)]
enum Op {
    Insert(u64, u32),
    DeleteExternal(u64),
    RemapInternal(u32, u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..40, 0u32..40).prop_map(|(e, i)| Op::Insert(e, i)),
        (0u64..40).prop_map(Op::DeleteExternal),
        (0u32..40, 0u32..40).prop_map(|(from, to)| Op::RemapInternal(from, to)),
    ]
}

proptest! {
    #[test]
    fn bijection_survives_arbitrary_op_sequences(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let mut t = IdTranslator::new();
        for op in ops {
            match op {
                Op::Insert(e, i) => {
                    let _ = t.insert(&[e], &[i], true);
                }
                Op::DeleteExternal(e) => {
                    let _ = t.delete_external(e);
                }
                Op::RemapInternal(from, to) => {
                    let _ = t.remap_internal(from, to);
                }
            }

            // After every operation (successful or rejected), the two
            // directions must agree: iterating `t.iter()` (driven by the
            // external->internal map) and probing every internal id that
            // map claims to hold must describe the same set of pairs.
            let forward: std::collections::HashSet<(u64, u32)> = t.iter().collect();
            let mut backward = std::collections::HashSet::new();
            for &(_, i) in &forward {
                let e = t.get_external(i).expect("internal id from forward map must resolve back");
                backward.insert((e, i));
            }
            prop_assert_eq!(&forward, &backward);
            prop_assert_eq!(forward.len(), t.size());
        }
    }
}
