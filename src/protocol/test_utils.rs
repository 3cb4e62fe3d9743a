//! Non-versioned round-trip helper, used by primitive and record-batch
//! tests. The versioned counterpart lives in `messages::test_utils`.

macro_rules! test_roundtrip {
    ($t:ty, $name:ident) => {
        proptest::proptest! {
            #![proptest_config(proptest::prelude::ProptestConfig{fork: false, ..Default::default()})]
            #[test]
            fn $name(orig: $t) {
                let mut buf = Vec::new();
                orig.write(&mut buf).unwrap();

                let mut cursor = std::io::Cursor::new(buf);
                let restored = <$t as crate::protocol::traits::ReadType<_>>::read(&mut cursor).unwrap();
                assert_eq!(orig, restored);
            }
        }
    };
}

pub(crate) use test_roundtrip;
