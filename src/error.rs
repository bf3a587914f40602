//! Discard-reason codes. These double as an ordinary [`std::error::Error`]
//! type at fallible API boundaries (parse/build functions return
//! `Result<_, DiscardCode>`) and as the `code` stamped onto a packet header
//! when a step funnels the packet to the discard step — the two are the
//! same value, never translated.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DiscardCode {
    #[error("interface not configured")]
    IntfcNotConfigured = 1,
    #[error("tx build exceeds MTU")]
    MtuExceeded = 2,
    #[error("offset/length metadata corrupted")]
    MetadataCorrupted = 3,
    #[error("insufficient headroom to prepend header")]
    Underrun = 4,
    #[error("particle pool exhausted while enlarging chain")]
    NoMorePcls = 5,
    #[error("particle chain operation failed")]
    PclOpFailed = 6,
    #[error("AHDLC control-character destuffing error")]
    AhdlcRxCc = 7,
    #[error("AHDLC CRC check failed")]
    AhdlcRxBadCrc = 8,
    #[error("AHDLC control-character stuffing overflow")]
    AhdlcTxCc = 9,
    #[error("PPP header malformed")]
    PppHeaderCorrupted = 10,
    #[error("PPP carried an IP protocol the interface doesn't support")]
    PppIpProtocolUnsupported = 11,
    #[error("PPP protocol field not recognized")]
    PppOtherProtocolUnsupported = 12,
    #[error("LCP/IPCP/IPV6CP code not supported")]
    PppXcpCodeUnsupported = 13,
    #[error("LCP/IPCP/IPV6CP option list malformed")]
    PppXcpParseError = 14,
    #[error("IP packet too small")]
    IpPacketTooSmall = 15,
    #[error("IP header malformed")]
    IpPacketHeaderCorrupted = 16,
    #[error("no interface matches this packet")]
    IpIntfcNotFound = 17,
    #[error("no sub-interface matches this destination address")]
    IpSubiNotFound = 18,
    #[error("no circuit matches this packet")]
    IpCircuitNotFound = 19,
    #[error("L4 checksum mismatch")]
    IpRxBadCrc = 20,
    #[error("L4 protocol is not UDP or ICMP")]
    IpUnsupportedL4 = 21,
    #[error("UDP datagram too small")]
    UdpPacketTooSmall = 22,
    #[error("no interface matches this UDP datagram")]
    UdpIntfcNotFound = 23,
    #[error("no sub-interface matches this UDP datagram")]
    UdpSubiNotFound = 24,
    #[error("no circuit matches this UDP datagram")]
    UdpCircuitNotFound = 25,
}

pub type DiscardResult<T> = Result<T, DiscardCode>;
