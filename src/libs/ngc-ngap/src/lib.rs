//! NextGCore NGAP Protocol Library
//!
//! High-level NGAP (NG Application Protocol) message building and parsing
//! for the AMF, as defined in 3GPP TS 38.413.
//!
//! # Architecture
//!
//! The library is layered on top of `ngc-asn1c` which provides raw ASN.1 APER
//! encoding/decoding. This crate adds:
//!
//! - **Strongly-typed message types** (`types`) for each NGAP procedure
//! - **Builder functions** (`builder`) to construct APER-encoded NGAP PDUs
//! - **Parser functions** (`parser`) to decode APER bytes into typed messages
//! - **IE helpers** (`ie`) for encoding/decoding individual Information Elements
//! - **Transfer containers** (`transfer`) nested in PDU session resource lists
//!
//! # Example
//!
//! ```no_run
//! use ngc_ngap::builder;
//! use ngc_ngap::types::*;
//!
//! let msg = DownlinkNasTransport {
//!     amf_ue_ngap_id: 1,
//!     ran_ue_ngap_id: 100,
//!     nas_pdu: vec![0x7e, 0x00, 0x56],
//! };
//! let bytes = builder::build_downlink_nas_transport(&msg).unwrap();
//!
//! use ngc_ngap::parser;
//! let decoded = parser::decode_ngap_pdu(&bytes).unwrap();
//! ```

pub mod error;
pub mod types;
pub mod ie;
pub mod transfer;
pub mod builder;
pub mod parser;

pub use error::{NgapError, NgapResult};
pub use types::*;
pub use parser::NgapMessage;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plmn() -> [u8; 3] {
        [0x00, 0xf1, 0x10]
    }

    fn uli() -> UserLocationInformation {
        UserLocationInformation::Nr {
            nr_cgi: NrCgi {
                plmn_identity: plmn(),
                nr_cell_identity: 0x0_0000_0010,
            },
            tai: Tai {
                plmn_identity: plmn(),
                tac: [0x00, 0x00, 0x01],
            },
        }
    }

    fn slice() -> SNssai {
        SNssai {
            sst: 1,
            sd: Some([0x01, 0x02, 0x03]),
        }
    }

    fn roundtrip(msg: NgapMessage) {
        let bytes = builder::build(&msg).unwrap();
        let decoded = parser::decode_ngap_pdu(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_downlink_nas_transport_roundtrip() {
        let msg = DownlinkNasTransport {
            amf_ue_ngap_id: 42,
            ran_ue_ngap_id: 100,
            nas_pdu: vec![0x7e, 0x00, 0x56, 0x01, 0x02],
        };

        let bytes = builder::build_downlink_nas_transport(&msg).unwrap();
        match parser::decode_ngap_pdu(&bytes).unwrap() {
            NgapMessage::DownlinkNasTransport(dl) => {
                assert_eq!(dl.amf_ue_ngap_id, 42);
                assert_eq!(dl.ran_ue_ngap_id, 100);
                assert_eq!(dl.nas_pdu, vec![0x7e, 0x00, 0x56, 0x01, 0x02]);
            }
            other => panic!("Expected DownlinkNasTransport, got {other:?}"),
        }
    }

    #[test]
    fn test_ng_setup_roundtrips() {
        roundtrip(NgapMessage::NgSetupRequest(NgSetupRequest {
            global_ran_node_id: GlobalRanNodeId::GlobalGnbId {
                plmn_identity: plmn(),
                gnb_id: 0x000001,
                gnb_id_len: 24,
            },
            ran_node_name: Some("gnb-1".into()),
            supported_ta_list: vec![SupportedTaItem {
                tac: [0x00, 0x00, 0x01],
                broadcast_plmn_list: vec![BroadcastPlmnItem {
                    plmn_identity: plmn(),
                    tai_slice_support_list: vec![slice()],
                }],
            }],
            default_paging_drx: PagingDrx::V128,
        }));

        roundtrip(NgapMessage::NgSetupResponse(NgSetupResponse {
            amf_name: "amf1".into(),
            served_guami_list: vec![ServedGuamiItem {
                guami: Guami {
                    plmn_identity: plmn(),
                    amf_region_id: 2,
                    amf_set_id: 1,
                    amf_pointer: 0,
                },
                backup_amf_name: None,
            }],
            relative_amf_capacity: 255,
            plmn_support_list: vec![PlmnSupportItem {
                plmn_identity: plmn(),
                slice_support_list: vec![slice()],
            }],
        }));

        roundtrip(NgapMessage::NgSetupFailure(NgSetupFailure {
            cause: Cause::Misc(CauseMisc::UnknownPlmn),
            time_to_wait: Some(TimeToWait::V10s),
        }));
    }

    #[test]
    fn test_ng_setup_failure_wire_layout() {
        let bytes = builder::build_ng_setup_failure(&NgSetupFailure {
            cause: Cause::Misc(CauseMisc::Unspecified),
            time_to_wait: None,
        })
        .unwrap();
        // unsuccessfulOutcome, NGSetup, reject, one Cause IE holding misc:unspecified
        assert_eq!(
            bytes,
            vec![0x40, 0x15, 0x00, 0x08, 0x00, 0x00, 0x01, 0x00, 0x0f, 0x40, 0x01, 0x8a]
        );
    }

    #[test]
    fn test_ran_config_update_and_reset_roundtrips() {
        roundtrip(NgapMessage::RanConfigurationUpdate(RanConfigurationUpdate {
            ran_node_name: Some("gnb-renamed".into()),
            ..Default::default()
        }));
        roundtrip(NgapMessage::RanConfigurationUpdateAcknowledge(
            RanConfigurationUpdateAcknowledge,
        ));
        roundtrip(NgapMessage::RanConfigurationUpdateFailure(
            RanConfigurationUpdateFailure {
                cause: Cause::Misc(CauseMisc::UnknownPlmn),
                time_to_wait: None,
            },
        ));
        roundtrip(NgapMessage::NgReset(NgReset {
            cause: Cause::Transport(CauseTransport::TransportResourceUnavailable),
            reset_type: ResetType::PartOfNgInterface(vec![UeAssociatedLogicalNgConnection {
                amf_ue_ngap_id: Some(3),
                ran_ue_ngap_id: None,
            }]),
        }));
        roundtrip(NgapMessage::NgResetAcknowledge(NgResetAcknowledge::default()));
        roundtrip(NgapMessage::ErrorIndication(ErrorIndication {
            amf_ue_ngap_id: None,
            ran_ue_ngap_id: Some(5),
            cause: Some(Cause::Protocol(CauseProtocol::MessageNotCompatibleWithReceiverState)),
        }));
    }

    #[test]
    fn test_ue_associated_roundtrips() {
        roundtrip(NgapMessage::InitialUeMessage(InitialUeMessage {
            ran_ue_ngap_id: 1,
            nas_pdu: vec![0x7e, 0x00, 0x41],
            user_location_info: uli(),
            rrc_establishment_cause: RrcEstablishmentCause::MoSignalling,
            five_g_s_tmsi: Some(FiveGSTmsi {
                amf_set_id: 1,
                amf_pointer: 0,
                five_g_tmsi: [0, 0, 0, 1],
            }),
            ue_context_request: true,
        }));
        roundtrip(NgapMessage::UplinkNasTransport(UplinkNasTransport {
            amf_ue_ngap_id: 1,
            ran_ue_ngap_id: 1,
            nas_pdu: vec![0x7e, 0x00, 0x57],
            user_location_info: uli(),
        }));
        roundtrip(NgapMessage::NasNonDeliveryIndication(NasNonDeliveryIndication {
            amf_ue_ngap_id: 1,
            ran_ue_ngap_id: 1,
            nas_pdu: vec![0x7e],
            cause: Cause::RadioNetwork(CauseRadioNetwork::RadioConnectionWithUeLost),
        }));
        roundtrip(NgapMessage::InitialContextSetupRequest(InitialContextSetupRequest {
            amf_ue_ngap_id: 1,
            ran_ue_ngap_id: 1,
            ue_ambr: Some(BitRates {
                dl: 1_000_000_000,
                ul: 1_000_000_000,
            }),
            guami: Guami {
                plmn_identity: plmn(),
                amf_region_id: 2,
                amf_set_id: 1,
                amf_pointer: 0,
            },
            allowed_nssai: vec![slice()],
            ue_security_capabilities: UeSecurityCapabilities {
                nr_encryption_algorithms: 0xe000,
                nr_integrity_algorithms: 0xe000,
                ..Default::default()
            },
            security_key: [0x5a; 32],
            pdu_session_list: vec![PduSessionResourceSetupItem {
                pdu_session_id: 1,
                nas_pdu: None,
                s_nssai: slice(),
                transfer: vec![0x00, 0x03],
            }],
            nas_pdu: Some(vec![0x7e, 0x02]),
        }));
        roundtrip(NgapMessage::InitialContextSetupResponse(InitialContextSetupResponse {
            amf_ue_ngap_id: 1,
            ran_ue_ngap_id: 1,
            setup_list: vec![PduSessionResourceItem {
                pdu_session_id: 1,
                transfer: vec![0x00, 0x01],
            }],
            failed_list: Vec::new(),
        }));
        roundtrip(NgapMessage::InitialContextSetupFailure(InitialContextSetupFailure {
            amf_ue_ngap_id: 1,
            ran_ue_ngap_id: 1,
            cause: Cause::RadioNetwork(CauseRadioNetwork::Unspecified),
        }));
        roundtrip(NgapMessage::UeContextReleaseCommand(UeContextReleaseCommand {
            ue_ngap_ids: UeNgapIds::Pair {
                amf_ue_ngap_id: 1,
                ran_ue_ngap_id: 1,
            },
            cause: Cause::Nas(CauseNas::NormalRelease),
        }));
        roundtrip(NgapMessage::UeContextReleaseComplete(UeContextReleaseComplete {
            amf_ue_ngap_id: 1,
            ran_ue_ngap_id: 1,
        }));
    }

    #[test]
    fn test_pdu_session_and_mobility_roundtrips() {
        roundtrip(NgapMessage::PduSessionResourceSetupRequest(
            PduSessionResourceSetupRequest {
                amf_ue_ngap_id: 1,
                ran_ue_ngap_id: 1,
                nas_pdu: None,
                pdu_session_list: vec![PduSessionResourceSetupItem {
                    pdu_session_id: 5,
                    nas_pdu: Some(vec![0x7e, 0x00, 0x68]),
                    s_nssai: slice(),
                    transfer: vec![0x00, 0x00, 0x01],
                }],
                ue_ambr: None,
            },
        ));
        roundtrip(NgapMessage::PduSessionResourceSetupResponse(
            PduSessionResourceSetupResponse {
                amf_ue_ngap_id: 1,
                ran_ue_ngap_id: 1,
                setup_list: vec![PduSessionResourceItem {
                    pdu_session_id: 5,
                    transfer: vec![1, 2, 3],
                }],
                failed_list: Vec::new(),
            },
        ));
        roundtrip(NgapMessage::Paging(Paging {
            ue_paging_identity: FiveGSTmsi {
                amf_set_id: 1,
                amf_pointer: 0,
                five_g_tmsi: [0xc0, 0x00, 0x00, 0x01],
            },
            paging_drx: Some(PagingDrx::V128),
            tai_list_for_paging: vec![Tai {
                plmn_identity: plmn(),
                tac: [0, 0, 1],
            }],
        }));
        roundtrip(NgapMessage::PathSwitchRequestAcknowledge(
            PathSwitchRequestAcknowledge {
                amf_ue_ngap_id: 1,
                ran_ue_ngap_id: 2,
                ue_security_capabilities: None,
                security_context: SecurityContext {
                    next_hop_chaining_count: 1,
                    next_hop_nh: [0x11; 32],
                },
                pdu_session_list: vec![PduSessionResourceItem {
                    pdu_session_id: 5,
                    transfer: vec![0x00],
                }],
                allowed_nssai: vec![slice()],
            },
        ));
    }

    #[test]
    fn test_missing_mandatory_ie() {
        // InitialUEMessage with only RAN-UE-NGAP-ID
        let mut container = ngc_asn1c::ngap::ProtocolIeContainer::new();
        ie::encode_ran_ue_ngap_id(&mut container, 1).unwrap();
        let pdu = ngc_asn1c::ngap::NgapPdu::InitiatingMessage(
            ngc_asn1c::ngap::InitiatingMessage::new(
                ngc_asn1c::ngap::ProcedureCode::INITIAL_UE_MESSAGE,
                ngc_asn1c::ngap::Criticality::Ignore,
                container,
            ),
        );
        let bytes = builder::encode_pdu(&pdu).unwrap();
        let err = parser::decode_ngap_pdu(&bytes).unwrap_err();
        assert!(matches!(err, NgapError::MissingMandatoryIe { ie_id: 38, .. }));
    }

    #[test]
    fn test_unsupported_procedure() {
        let pdu = ngc_asn1c::ngap::NgapPdu::InitiatingMessage(
            ngc_asn1c::ngap::InitiatingMessage::new(
                ngc_asn1c::ngap::ProcedureCode::HANDOVER_PREPARATION,
                ngc_asn1c::ngap::Criticality::Reject,
                ngc_asn1c::ngap::ProtocolIeContainer::new(),
            ),
        );
        let bytes = builder::encode_pdu(&pdu).unwrap();
        let err = parser::decode_ngap_pdu(&bytes).unwrap_err();
        assert!(matches!(
            err,
            NgapError::UnsupportedProcedure {
                procedure_code: 12,
                ..
            }
        ));
    }

    // ------------------------------------------------------------------
    // Message strategies. Values stay inside the ranges the IEs encode.
    // ------------------------------------------------------------------

    fn arb_plmn() -> impl Strategy<Value = [u8; 3]> {
        any::<[u8; 3]>()
    }

    fn arb_bytes(max: usize) -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 1..max)
    }

    fn arb_name() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9]{1,32}"
    }

    fn arb_amf_ue_ngap_id() -> impl Strategy<Value = u64> {
        0u64..(1u64 << 40)
    }

    fn arb_s_nssai() -> impl Strategy<Value = SNssai> {
        (any::<u8>(), proptest::option::of(any::<[u8; 3]>())).prop_map(|(sst, sd)| SNssai { sst, sd })
    }

    fn arb_slices(max: usize) -> impl Strategy<Value = Vec<SNssai>> {
        proptest::collection::vec(arb_s_nssai(), 1..max)
    }

    fn arb_tai() -> impl Strategy<Value = Tai> {
        (arb_plmn(), any::<[u8; 3]>()).prop_map(|(plmn_identity, tac)| Tai { plmn_identity, tac })
    }

    fn arb_uli() -> impl Strategy<Value = UserLocationInformation> {
        (arb_plmn(), 0u64..(1u64 << 36), arb_tai()).prop_map(|(plmn_identity, nr_cell_identity, tai)| {
            UserLocationInformation::Nr {
                nr_cgi: NrCgi {
                    plmn_identity,
                    nr_cell_identity,
                },
                tai,
            }
        })
    }

    fn arb_guami() -> impl Strategy<Value = Guami> {
        (arb_plmn(), any::<u8>(), 0u16..1024, 0u8..64).prop_map(
            |(plmn_identity, amf_region_id, amf_set_id, amf_pointer)| Guami {
                plmn_identity,
                amf_region_id,
                amf_set_id,
                amf_pointer,
            },
        )
    }

    fn arb_global_ran_node_id() -> impl Strategy<Value = GlobalRanNodeId> {
        prop_oneof![
            (arb_plmn(), 22u8..=32, any::<u32>()).prop_map(|(plmn_identity, gnb_id_len, id)| {
                let gnb_id = if gnb_id_len == 32 { id } else { id & ((1u32 << gnb_id_len) - 1) };
                GlobalRanNodeId::GlobalGnbId {
                    plmn_identity,
                    gnb_id,
                    gnb_id_len,
                }
            }),
            (arb_plmn(), 0u32..(1 << 20)).prop_map(|(plmn_identity, ng_enb_id)| {
                GlobalRanNodeId::GlobalNgEnbId {
                    plmn_identity,
                    ng_enb_id,
                }
            }),
        ]
    }

    fn arb_supported_ta_list() -> impl Strategy<Value = Vec<SupportedTaItem>> {
        let bplmn = (arb_plmn(), arb_slices(3)).prop_map(|(plmn_identity, tai_slice_support_list)| {
            BroadcastPlmnItem {
                plmn_identity,
                tai_slice_support_list,
            }
        });
        let item = (any::<[u8; 3]>(), proptest::collection::vec(bplmn, 1..3))
            .prop_map(|(tac, broadcast_plmn_list)| SupportedTaItem { tac, broadcast_plmn_list });
        proptest::collection::vec(item, 1..3)
    }

    fn arb_cause() -> impl Strategy<Value = Cause> {
        prop_oneof![
            Just(Cause::RadioNetwork(CauseRadioNetwork::Unspecified)),
            Just(Cause::RadioNetwork(CauseRadioNetwork::RadioConnectionWithUeLost)),
            Just(Cause::Transport(CauseTransport::TransportResourceUnavailable)),
            Just(Cause::Nas(CauseNas::NormalRelease)),
            Just(Cause::Nas(CauseNas::Deregister)),
            Just(Cause::Protocol(CauseProtocol::SemanticError)),
            Just(Cause::Misc(CauseMisc::UnknownPlmn)),
        ]
    }

    fn arb_time_to_wait() -> impl Strategy<Value = TimeToWait> {
        prop_oneof![Just(TimeToWait::V1s), Just(TimeToWait::V10s), Just(TimeToWait::V60s)]
    }

    fn arb_paging_drx() -> impl Strategy<Value = PagingDrx> {
        prop_oneof![
            Just(PagingDrx::V32),
            Just(PagingDrx::V64),
            Just(PagingDrx::V128),
            Just(PagingDrx::V256)
        ]
    }

    fn arb_five_g_s_tmsi() -> impl Strategy<Value = FiveGSTmsi> {
        (0u16..1024, 0u8..64, any::<[u8; 4]>()).prop_map(|(amf_set_id, amf_pointer, five_g_tmsi)| {
            FiveGSTmsi {
                amf_set_id,
                amf_pointer,
                five_g_tmsi,
            }
        })
    }

    fn arb_security_capabilities() -> impl Strategy<Value = UeSecurityCapabilities> {
        any::<[u16; 4]>().prop_map(|m| UeSecurityCapabilities {
            nr_encryption_algorithms: m[0],
            nr_integrity_algorithms: m[1],
            eutra_encryption_algorithms: m[2],
            eutra_integrity_algorithms: m[3],
        })
    }

    fn arb_bit_rates() -> impl Strategy<Value = BitRates> {
        (0u64..=10_000_000_000, 0u64..=10_000_000_000).prop_map(|(dl, ul)| BitRates { dl, ul })
    }

    fn arb_connections() -> impl Strategy<Value = Vec<UeAssociatedLogicalNgConnection>> {
        let item = (
            proptest::option::of(arb_amf_ue_ngap_id()),
            proptest::option::of(any::<u32>()),
        )
            .prop_map(|(amf_ue_ngap_id, ran_ue_ngap_id)| UeAssociatedLogicalNgConnection {
                amf_ue_ngap_id,
                ran_ue_ngap_id,
            });
        proptest::collection::vec(item, 1..4)
    }

    fn arb_items(min: usize) -> impl Strategy<Value = Vec<PduSessionResourceItem>> {
        let item = (any::<u8>(), arb_bytes(16)).prop_map(|(pdu_session_id, transfer)| {
            PduSessionResourceItem {
                pdu_session_id,
                transfer,
            }
        });
        proptest::collection::vec(item, min..4)
    }

    fn arb_setup_items(min: usize) -> impl Strategy<Value = Vec<PduSessionResourceSetupItem>> {
        let item = (
            any::<u8>(),
            proptest::option::of(arb_bytes(32)),
            arb_s_nssai(),
            arb_bytes(32),
        )
            .prop_map(|(pdu_session_id, nas_pdu, s_nssai, transfer)| {
                PduSessionResourceSetupItem {
                    pdu_session_id,
                    nas_pdu,
                    s_nssai,
                    transfer,
                }
            });
        proptest::collection::vec(item, min..4)
    }

    /// Any message the crate builds and parses
    fn arb_ngap_message() -> impl Strategy<Value = NgapMessage> {
        use proptest::option::of;
        use proptest::strategy::Union;

        let ids = || (arb_amf_ue_ngap_id(), any::<u32>());

        Union::new(vec![
            (arb_global_ran_node_id(), of(arb_name()), arb_supported_ta_list(), arb_paging_drx())
                .prop_map(|(global_ran_node_id, ran_node_name, supported_ta_list, default_paging_drx)| {
                    NgapMessage::NgSetupRequest(NgSetupRequest {
                        global_ran_node_id,
                        ran_node_name,
                        supported_ta_list,
                        default_paging_drx,
                    })
                })
                .boxed(),
            (
                arb_name(),
                proptest::collection::vec(
                    (arb_guami(), of(arb_name()))
                        .prop_map(|(guami, backup_amf_name)| ServedGuamiItem { guami, backup_amf_name }),
                    1..3,
                ),
                any::<u8>(),
                proptest::collection::vec(
                    (arb_plmn(), arb_slices(3)).prop_map(|(plmn_identity, slice_support_list)| {
                        PlmnSupportItem {
                            plmn_identity,
                            slice_support_list,
                        }
                    }),
                    1..3,
                ),
            )
                .prop_map(|(amf_name, served_guami_list, relative_amf_capacity, plmn_support_list)| {
                    NgapMessage::NgSetupResponse(NgSetupResponse {
                        amf_name,
                        served_guami_list,
                        relative_amf_capacity,
                        plmn_support_list,
                    })
                })
                .boxed(),
            (arb_cause(), of(arb_time_to_wait()))
                .prop_map(|(cause, time_to_wait)| {
                    NgapMessage::NgSetupFailure(NgSetupFailure { cause, time_to_wait })
                })
                .boxed(),
            (
                of(arb_name()),
                of(arb_supported_ta_list()),
                of(arb_paging_drx()),
                of(arb_global_ran_node_id()),
            )
                .prop_map(|(ran_node_name, supported_ta_list, default_paging_drx, global_ran_node_id)| {
                    NgapMessage::RanConfigurationUpdate(RanConfigurationUpdate {
                        ran_node_name,
                        supported_ta_list,
                        default_paging_drx,
                        global_ran_node_id,
                    })
                })
                .boxed(),
            Just(NgapMessage::RanConfigurationUpdateAcknowledge(
                RanConfigurationUpdateAcknowledge,
            ))
            .boxed(),
            (arb_cause(), of(arb_time_to_wait()))
                .prop_map(|(cause, time_to_wait)| {
                    NgapMessage::RanConfigurationUpdateFailure(RanConfigurationUpdateFailure {
                        cause,
                        time_to_wait,
                    })
                })
                .boxed(),
            (
                arb_cause(),
                prop_oneof![
                    Just(ResetType::NgInterface),
                    arb_connections().prop_map(ResetType::PartOfNgInterface),
                ],
            )
                .prop_map(|(cause, reset_type)| NgapMessage::NgReset(NgReset { cause, reset_type }))
                .boxed(),
            of(arb_connections())
                .prop_map(|connections| {
                    NgapMessage::NgResetAcknowledge(NgResetAcknowledge { connections })
                })
                .boxed(),
            (of(arb_amf_ue_ngap_id()), of(any::<u32>()), of(arb_cause()))
                .prop_map(|(amf_ue_ngap_id, ran_ue_ngap_id, cause)| {
                    NgapMessage::ErrorIndication(ErrorIndication {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        cause,
                    })
                })
                .boxed(),
            (
                any::<u32>(),
                arb_bytes(64),
                arb_uli(),
                prop_oneof![
                    Just(RrcEstablishmentCause::MoSignalling),
                    Just(RrcEstablishmentCause::MoData),
                    Just(RrcEstablishmentCause::MtAccess),
                ],
                of(arb_five_g_s_tmsi()),
                any::<bool>(),
            )
                .prop_map(
                    |(
                        ran_ue_ngap_id,
                        nas_pdu,
                        user_location_info,
                        rrc_establishment_cause,
                        five_g_s_tmsi,
                        ue_context_request,
                    )| {
                        NgapMessage::InitialUeMessage(InitialUeMessage {
                            ran_ue_ngap_id,
                            nas_pdu,
                            user_location_info,
                            rrc_establishment_cause,
                            five_g_s_tmsi,
                            ue_context_request,
                        })
                    },
                )
                .boxed(),
            (ids(), arb_bytes(64))
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), nas_pdu)| {
                    NgapMessage::DownlinkNasTransport(DownlinkNasTransport {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        nas_pdu,
                    })
                })
                .boxed(),
            (ids(), arb_bytes(512), arb_uli())
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), nas_pdu, user_location_info)| {
                    NgapMessage::UplinkNasTransport(UplinkNasTransport {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        nas_pdu,
                        user_location_info,
                    })
                })
                .boxed(),
            (ids(), arb_bytes(64), arb_cause())
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), nas_pdu, cause)| {
                    NgapMessage::NasNonDeliveryIndication(NasNonDeliveryIndication {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        nas_pdu,
                        cause,
                    })
                })
                .boxed(),
            (
                ids(),
                of(arb_bit_rates()),
                arb_guami(),
                arb_slices(9),
                arb_security_capabilities(),
                any::<[u8; 32]>(),
                arb_setup_items(0),
                of(arb_bytes(64)),
            )
                .prop_map(
                    |(
                        (amf_ue_ngap_id, ran_ue_ngap_id),
                        ue_ambr,
                        guami,
                        allowed_nssai,
                        ue_security_capabilities,
                        security_key,
                        pdu_session_list,
                        nas_pdu,
                    )| {
                        NgapMessage::InitialContextSetupRequest(InitialContextSetupRequest {
                            amf_ue_ngap_id,
                            ran_ue_ngap_id,
                            ue_ambr,
                            guami,
                            allowed_nssai,
                            ue_security_capabilities,
                            security_key,
                            pdu_session_list,
                            nas_pdu,
                        })
                    },
                )
                .boxed(),
            (ids(), arb_items(0), arb_items(0))
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), setup_list, failed_list)| {
                    NgapMessage::InitialContextSetupResponse(InitialContextSetupResponse {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        setup_list,
                        failed_list,
                    })
                })
                .boxed(),
            (ids(), arb_cause())
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), cause)| {
                    NgapMessage::InitialContextSetupFailure(InitialContextSetupFailure {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        cause,
                    })
                })
                .boxed(),
            (ids(), arb_cause())
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), cause)| {
                    NgapMessage::UeContextReleaseRequest(UeContextReleaseRequest {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        cause,
                    })
                })
                .boxed(),
            (
                prop_oneof![
                    ids().prop_map(|(amf_ue_ngap_id, ran_ue_ngap_id)| UeNgapIds::Pair {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                    }),
                    arb_amf_ue_ngap_id().prop_map(UeNgapIds::AmfOnly),
                ],
                arb_cause(),
            )
                .prop_map(|(ue_ngap_ids, cause)| {
                    NgapMessage::UeContextReleaseCommand(UeContextReleaseCommand { ue_ngap_ids, cause })
                })
                .boxed(),
            ids()
                .prop_map(|(amf_ue_ngap_id, ran_ue_ngap_id)| {
                    NgapMessage::UeContextReleaseComplete(UeContextReleaseComplete {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                    })
                })
                .boxed(),
            (ids(), of(arb_bytes(64)), arb_setup_items(1), of(arb_bit_rates()))
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), nas_pdu, pdu_session_list, ue_ambr)| {
                    NgapMessage::PduSessionResourceSetupRequest(PduSessionResourceSetupRequest {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        nas_pdu,
                        pdu_session_list,
                        ue_ambr,
                    })
                })
                .boxed(),
            (ids(), arb_items(0), arb_items(0))
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), setup_list, failed_list)| {
                    NgapMessage::PduSessionResourceSetupResponse(PduSessionResourceSetupResponse {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        setup_list,
                        failed_list,
                    })
                })
                .boxed(),
            (ids(), of(arb_bytes(64)), arb_items(1))
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), nas_pdu, pdu_session_list)| {
                    NgapMessage::PduSessionResourceReleaseCommand(PduSessionResourceReleaseCommand {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        nas_pdu,
                        pdu_session_list,
                    })
                })
                .boxed(),
            (ids(), arb_items(1))
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), released_list)| {
                    NgapMessage::PduSessionResourceReleaseResponse(PduSessionResourceReleaseResponse {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        released_list,
                    })
                })
                .boxed(),
            (
                arb_five_g_s_tmsi(),
                of(arb_paging_drx()),
                proptest::collection::vec(arb_tai(), 1..4),
            )
                .prop_map(|(ue_paging_identity, paging_drx, tai_list_for_paging)| {
                    NgapMessage::Paging(Paging {
                        ue_paging_identity,
                        paging_drx,
                        tai_list_for_paging,
                    })
                })
                .boxed(),
            (ids(), arb_uli(), arb_security_capabilities(), arb_items(1))
                .prop_map(
                    |(
                        (source_amf_ue_ngap_id, ran_ue_ngap_id),
                        user_location_info,
                        ue_security_capabilities,
                        pdu_session_list,
                    )| {
                        NgapMessage::PathSwitchRequest(PathSwitchRequest {
                            ran_ue_ngap_id,
                            source_amf_ue_ngap_id,
                            user_location_info,
                            ue_security_capabilities,
                            pdu_session_list,
                        })
                    },
                )
                .boxed(),
            (
                ids(),
                of(arb_security_capabilities()),
                (0u8..8, any::<[u8; 32]>()),
                arb_items(1),
                arb_slices(9),
            )
                .prop_map(
                    |(
                        (amf_ue_ngap_id, ran_ue_ngap_id),
                        ue_security_capabilities,
                        (next_hop_chaining_count, next_hop_nh),
                        pdu_session_list,
                        allowed_nssai,
                    )| {
                        NgapMessage::PathSwitchRequestAcknowledge(PathSwitchRequestAcknowledge {
                            amf_ue_ngap_id,
                            ran_ue_ngap_id,
                            ue_security_capabilities,
                            security_context: SecurityContext {
                                next_hop_chaining_count,
                                next_hop_nh,
                            },
                            pdu_session_list,
                            allowed_nssai,
                        })
                    },
                )
                .boxed(),
            (ids(), arb_items(1))
                .prop_map(|((amf_ue_ngap_id, ran_ue_ngap_id), released_list)| {
                    NgapMessage::PathSwitchRequestFailure(PathSwitchRequestFailure {
                        amf_ue_ngap_id,
                        ran_ue_ngap_id,
                        released_list,
                    })
                })
                .boxed(),
        ])
    }

    proptest! {
        #[test]
        fn prop_roundtrip(msg in arb_ngap_message()) {
            let bytes = builder::build(&msg).unwrap();
            prop_assert_eq!(parser::decode_ngap_pdu(&bytes).unwrap(), msg);
        }

        #[test]
        fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = parser::decode_ngap_pdu(&data);
        }
    }
}
