macro_rules! test_roundtrip {
    ($t:ty, $name:ident) => {
        proptest! {
            #[test]
            fn $name(orig: $t) {
                let mut buf = Cursor::new(Vec::<u8>::new());
                orig.write(&mut buf).unwrap();
                buf.set_position(0);
                let restored = <$t>::read(&mut buf).unwrap();
                assert_eq!(orig, restored);
            }
        }
    };
}

pub(crate) use test_roundtrip;
