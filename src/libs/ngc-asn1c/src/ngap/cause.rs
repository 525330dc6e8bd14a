//! NGAP Cause Types
//!
//! Cause types from NGAP-IEs (3GPP TS 38.413)

use std::fmt;

use crate::per::{AperDecode, AperDecoder, AperEncode, AperEncoder, Constraint, PerError, PerResult};

aper_enumerated! {
    /// CauseRadioNetwork - Radio network layer cause values
    pub enum CauseRadioNetwork (Constraint::extensible(0, 44)) {
        Unspecified = 0,
        TxnrelocoverallExpiry = 1,
        SuccessfulHandover = 2,
        ReleaseDueToNgranGeneratedReason = 3,
        ReleaseDueTo5gcGeneratedReason = 4,
        HandoverCancelled = 5,
        PartialHandover = 6,
        HoFailureInTarget5gcNgranNodeOrTargetSystem = 7,
        HoTargetNotAllowed = 8,
        TngrelocoverallExpiry = 9,
        TngrelocprepExpiry = 10,
        CellNotAvailable = 11,
        UnknownTargetId = 12,
        NoRadioResourcesAvailableInTargetCell = 13,
        UnknownLocalUeNgapId = 14,
        InconsistentRemoteUeNgapId = 15,
        HandoverDesirableForRadioReason = 16,
        TimeCriticalHandover = 17,
        ResourceOptimisationHandover = 18,
        ReduceLoadInServingCell = 19,
        UserInactivity = 20,
        RadioConnectionWithUeLost = 21,
        RadioResourcesNotAvailable = 22,
        InvalidQosCombination = 23,
        FailureInRadioInterfaceProcedure = 24,
        InteractionWithOtherProcedure = 25,
        UnknownPduSessionId = 26,
        UnknownQosFlowId = 27,
        MultiplePduSessionIdInstances = 28,
        MultipleQosFlowIdInstances = 29,
        EncryptionAndOrIntegrityProtectionAlgorithmsNotSupported = 30,
        NgIntraSystemHandoverTriggered = 31,
        NgInterSystemHandoverTriggered = 32,
        XnHandoverTriggered = 33,
        NotSupported5qiValue = 34,
        UeContextTransfer = 35,
        ImsVoiceEpsFallbackOrRatFallbackTriggered = 36,
        UpIntegrityProtectionNotPossible = 37,
        UpConfidentialityProtectionNotPossible = 38,
        SliceNotSupported = 39,
        UeInRrcInactiveStateNotReachable = 40,
        Redirection = 41,
        ResourcesNotAvailableForTheSlice = 42,
        UeMaxIntegrityProtectedDataRateReason = 43,
        ReleaseDueToCnDetectedMobility = 44,
        N26InterfaceNotAvailable = 45,
        ReleaseDueToPreEmption = 46,
    }
}

aper_enumerated! {
    /// CauseTransport - Transport layer cause values
    pub enum CauseTransport (Constraint::extensible(0, 1)) {
        TransportResourceUnavailable = 0,
        Unspecified = 1,
    }
}

aper_enumerated! {
    /// CauseNas - NAS layer cause values
    pub enum CauseNas (Constraint::extensible(0, 3)) {
        NormalRelease = 0,
        AuthenticationFailure = 1,
        Deregister = 2,
        Unspecified = 3,
    }
}

aper_enumerated! {
    /// CauseProtocol - Protocol layer cause values
    pub enum CauseProtocol (Constraint::extensible(0, 6)) {
        TransferSyntaxError = 0,
        AbstractSyntaxErrorReject = 1,
        AbstractSyntaxErrorIgnoreAndNotify = 2,
        MessageNotCompatibleWithReceiverState = 3,
        SemanticError = 4,
        AbstractSyntaxErrorFalselyConstructedMessage = 5,
        Unspecified = 6,
    }
}

aper_enumerated! {
    /// CauseMisc - Miscellaneous cause values
    pub enum CauseMisc (Constraint::extensible(0, 5)) {
        ControlProcessingOverload = 0,
        NotEnoughUserPlaneProcessingResources = 1,
        HardwareFailure = 2,
        OmIntervention = 3,
        UnknownPlmn = 4,
        Unspecified = 5,
    }
}

/// Cause - CHOICE type for all cause categories
/// ASN.1: Cause ::= CHOICE { radioNetwork, transport, nas, protocol, misc, choice-Extensions }
///
/// `choice-Extensions` is an ordinary alternative, not an extension marker,
/// so the index is a plain 3-bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cause {
    RadioNetwork(CauseRadioNetwork),
    Transport(CauseTransport),
    Nas(CauseNas),
    Protocol(CauseProtocol),
    Misc(CauseMisc),
}

impl Cause {
    pub const NUM_ALTERNATIVES: usize = 6;
    pub const EXTENSIBLE: bool = false;
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::RadioNetwork(v) => write!(f, "radioNetwork:{v:?}"),
            Cause::Transport(v) => write!(f, "transport:{v:?}"),
            Cause::Nas(v) => write!(f, "nas:{v:?}"),
            Cause::Protocol(v) => write!(f, "protocol:{v:?}"),
            Cause::Misc(v) => write!(f, "misc:{v:?}"),
        }
    }
}

impl AperEncode for Cause {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        let (index, value): (usize, &dyn AperEncode) = match self {
            Cause::RadioNetwork(v) => (0, v as &dyn AperEncode),
            Cause::Transport(v) => (1, v as &dyn AperEncode),
            Cause::Nas(v) => (2, v as &dyn AperEncode),
            Cause::Protocol(v) => (3, v as &dyn AperEncode),
            Cause::Misc(v) => (4, v as &dyn AperEncode),
        };
        encoder.encode_choice_index(index, Self::NUM_ALTERNATIVES, Self::EXTENSIBLE)?;
        value.encode_aper(encoder)
    }
}

impl AperDecode for Cause {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let index = decoder.decode_choice_index(Self::NUM_ALTERNATIVES, Self::EXTENSIBLE)?;
        match index {
            0 => Ok(Cause::RadioNetwork(CauseRadioNetwork::decode_aper(decoder)?)),
            1 => Ok(Cause::Transport(CauseTransport::decode_aper(decoder)?)),
            2 => Ok(Cause::Nas(CauseNas::decode_aper(decoder)?)),
            3 => Ok(Cause::Protocol(CauseProtocol::decode_aper(decoder)?)),
            4 => Ok(Cause::Misc(CauseMisc::decode_aper(decoder)?)),
            5 => Err(PerError::UnsupportedExtension),
            _ => Err(PerError::InvalidChoiceIndex {
                index,
                max: Self::NUM_ALTERNATIVES - 1,
            }),
        }
    }
}
