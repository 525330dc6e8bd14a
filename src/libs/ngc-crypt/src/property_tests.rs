//! Property-based tests for the crypto primitives

use proptest::prelude::*;

use crate::kdf;
use crate::milenage::{self, MilenageError};
use crate::nas_alg::{nea2, nia2, NAS_BEARER_3GPP};

proptest! {
    #[test]
    fn prop_derive_opc_deterministic(k in any::<[u8; 16]>(), op in any::<[u8; 16]>()) {
        let a = milenage::derive_opc(&k, &op).unwrap();
        let b = milenage::derive_opc(&k, &op).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_derive_opc_rejects_bad_lengths(len in 0usize..40) {
        prop_assume!(len != 16);
        let bad = vec![0u8; len];
        prop_assert_eq!(
            milenage::derive_opc(&bad, &[0u8; 16]),
            Err(MilenageError::InvalidKeyMaterial { field: "K", len })
        );
        prop_assert_eq!(
            milenage::derive_opc(&[0u8; 16], &bad),
            Err(MilenageError::InvalidKeyMaterial { field: "OP", len })
        );
        // K is checked first
        prop_assert_eq!(
            milenage::derive_opc(&bad, &bad),
            Err(MilenageError::InvalidKeyMaterial { field: "K", len })
        );
    }

    #[test]
    fn prop_nea2_is_involution(
        key in any::<[u8; 16]>(),
        count in any::<u32>(),
        direction in 0u8..2,
        data in proptest::collection::vec(any::<u8>(), 0..128),
    ) {
        let mut work = data.clone();
        nea2(&key, count, NAS_BEARER_3GPP, direction, &mut work);
        nea2(&key, count, NAS_BEARER_3GPP, direction, &mut work);
        prop_assert_eq!(work, data);
    }

    #[test]
    fn prop_nia2_count_sensitive(key in any::<[u8; 16]>(), count in 0u32..u32::MAX) {
        let a = nia2(&key, count, NAS_BEARER_3GPP, 0, b"nas");
        let b = nia2(&key, count + 1, NAS_BEARER_3GPP, 0, b"nas");
        prop_assert_ne!(a, b);
    }

    #[test]
    fn prop_generate_then_check(
        k in any::<[u8; 16]>(),
        opc in any::<[u8; 16]>(),
        rand in any::<[u8; 16]>(),
        sqn in 1u64..0xffff_ffff_fffe,
    ) {
        let sqn_bytes = {
            let b = sqn.to_be_bytes();
            let mut s = [0u8; 6];
            s.copy_from_slice(&b[2..]);
            s
        };
        let av = milenage::generate(&opc, &k, &sqn_bytes, &[0x80, 0x00], &rand);
        let older = {
            let b = (sqn - 1).to_be_bytes();
            let mut s = [0u8; 6];
            s.copy_from_slice(&b[2..]);
            s
        };
        let (res, ck, ik) = milenage::check_autn(&opc, &k, &older, &rand, &av.autn).unwrap();
        prop_assert_eq!(res, av.xres);
        prop_assert_eq!(ck, av.ck);
        prop_assert_eq!(ik, av.ik);
    }

    #[test]
    fn prop_kamf_depends_on_abba(kseaf in any::<[u8; 32]>(), abba in any::<[u8; 2]>()) {
        prop_assume!(abba != [0, 0]);
        let a = kdf::kamf(&kseaf, "imsi-001010000000001", &[0, 0]).unwrap();
        let b = kdf::kamf(&kseaf, "imsi-001010000000001", &abba).unwrap();
        prop_assert_ne!(a, b);
    }
}
