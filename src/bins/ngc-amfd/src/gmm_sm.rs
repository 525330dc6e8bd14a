//! GMM State Machine
//!
//! Registration state of one UE plus the NAS procedure currently
//! outstanding towards it. The handlers drive transitions; this module
//! only records them and decides which uplink messages are acceptable.

use ngc_nas::fiveg::FiveGmmMessageType;

/// GMM state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GmmState {
    #[default]
    Deregistered,
    /// Initial UE Message with a registration request received
    InitialAccessReceived,
    /// Challenge sent, waiting for RES*
    Authenticating,
    /// NAS security established, Registration Accept pending
    SecurityContextEstablished,
    Registered,
    PduSessionEstablishing,
    PduSessionActive,
    Deregistering,
}

impl GmmState {
    pub fn name(&self) -> &'static str {
        match self {
            GmmState::Deregistered => "GMM_STATE_DE_REGISTERED",
            GmmState::InitialAccessReceived => "GMM_STATE_INITIAL_ACCESS_RECEIVED",
            GmmState::Authenticating => "GMM_STATE_AUTHENTICATING",
            GmmState::SecurityContextEstablished => "GMM_STATE_SECURITY_CONTEXT_ESTABLISHED",
            GmmState::Registered => "GMM_STATE_REGISTERED",
            GmmState::PduSessionEstablishing => "GMM_STATE_PDU_SESSION_ESTABLISHING",
            GmmState::PduSessionActive => "GMM_STATE_PDU_SESSION_ACTIVE",
            GmmState::Deregistering => "GMM_STATE_DE_REGISTERING",
        }
    }

    /// Registered or in one of the PDU session substates
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            GmmState::Registered | GmmState::PduSessionEstablishing | GmmState::PduSessionActive
        )
    }
}

impl std::fmt::Display for GmmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Network-initiated NAS procedure awaiting an answer from the UE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Procedure {
    #[default]
    None,
    Identity,
    Authentication,
    SecurityMode,
    RegistrationAccept,
    Deregistration,
}

/// GMM State Machine
#[derive(Debug, Clone)]
pub struct GmmFsm {
    pub state: GmmState,
    pub procedure: Procedure,
    pub amf_ue_ngap_id: u64,
}

impl GmmFsm {
    pub fn new(amf_ue_ngap_id: u64) -> Self {
        Self {
            state: GmmState::Deregistered,
            procedure: Procedure::None,
            amf_ue_ngap_id,
        }
    }

    pub fn transition(&mut self, next: GmmState) {
        if self.state == next {
            return;
        }
        log::debug!(
            "GMM state transition: {} -> {} (amf_ue_ngap_id={})",
            self.state.name(),
            next.name(),
            self.amf_ue_ngap_id
        );
        self.state = next;
    }

    pub fn start(&mut self, procedure: Procedure) {
        self.procedure = procedure;
    }

    pub fn finish(&mut self) {
        self.procedure = Procedure::None;
    }

    /// Abandon whatever is outstanding and fall back to DE_REGISTERED
    pub fn abort(&mut self) {
        self.procedure = Procedure::None;
        self.transition(GmmState::Deregistered);
    }

    /// Whether an uplink 5GMM message fits the current state and procedure
    pub fn accepts(&self, message_type: FiveGmmMessageType) -> bool {
        match message_type {
            FiveGmmMessageType::RegistrationRequest
            | FiveGmmMessageType::DeregistrationRequestFromUe
            | FiveGmmMessageType::FiveGmmStatus => true,
            FiveGmmMessageType::IdentityResponse => self.procedure == Procedure::Identity,
            FiveGmmMessageType::AuthenticationResponse | FiveGmmMessageType::AuthenticationFailure => {
                self.procedure == Procedure::Authentication
            }
            FiveGmmMessageType::SecurityModeComplete | FiveGmmMessageType::SecurityModeReject => {
                self.procedure == Procedure::SecurityMode
            }
            FiveGmmMessageType::RegistrationComplete => self.procedure == Procedure::RegistrationAccept,
            FiveGmmMessageType::UlNasTransport => self.state.is_registered(),
            FiveGmmMessageType::DeregistrationAcceptToUe => self.procedure == Procedure::Deregistration,
            _ => false,
        }
    }
}
