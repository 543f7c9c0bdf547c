//! WHO-HAS compose and IS-AT parse: the wire format of the multicast name
//! service, independent of the bus wire codec proper (this is a separate,
//! much smaller packet grammar, unrelated to `ajbus-wire`'s signature-driven
//! one).

use tracing::debug;

use crate::error::NsError;

const MSG_V1: u8 = 0x01;
const NSV_V1: u8 = 0x10;

const U6_FLAG: u8 = 0x01;
const R6_FLAG: u8 = 0x02;
const U4_FLAG: u8 = 0x04;
const R4_FLAG: u8 = 0x08;
const G_FLAG: u8 = 0x20;

const WHO_HAS_MSG: u8 = 0x80;
const IS_AT_MSG: u8 = 0x40;

fn msg_type(flags: u8) -> u8 {
    flags & 0xC0
}

fn msg_version(version: u8) -> u8 {
    version & 0x0F
}

/// Which address families a discovered service answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddrTypes {
    /// The answer carried a reliable IPv4 address.
    pub ipv4: bool,
    /// The answer carried a reliable IPv6 address.
    pub ipv6: bool,
}

/// A service located by [`crate::discover::discover`], decoded from an
/// IS-AT packet's first matching answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscoveredService {
    /// Transport mask the answer was sent over.
    pub transport_mask: u16,
    /// Which address families are populated below.
    pub addr_types: AddrTypes,
    /// Reliable IPv4 address, valid iff `addr_types.ipv4`.
    pub ipv4: [u8; 4],
    /// Reliable IPv4 port, valid iff `addr_types.ipv4`.
    pub ipv4_port: u16,
    /// Reliable IPv6 address, valid iff `addr_types.ipv6`.
    pub ipv6: [u8; 16],
    /// Reliable IPv6 port, valid iff `addr_types.ipv6`.
    pub ipv6_port: u16,
}

/// Writes a WHO-HAS packet querying for `prefix` into `out`, returning the
/// number of bytes written.
///
/// # Errors
///
/// Returns [`NsError::Resources`] if `out` is too small.
pub fn compose_who_has(out: &mut [u8], prefix: &str) -> Result<usize, NsError> {
    let pre_len = prefix.len();
    let total = 6 + pre_len + 2;
    if total > out.len() {
        return Err(NsError::Resources { needed: total });
    }
    out[0] = MSG_V1 | NSV_V1;
    out[1] = 1; // qCount
    out[2] = 0; // aCount
    out[3] = 0; // ttl
    out[4] = WHO_HAS_MSG;
    out[5] = 1; // nameCount
    out[6] = (pre_len + 1) as u8;
    out[7..7 + pre_len].copy_from_slice(prefix.as_bytes());
    out[7 + pre_len] = b'*';
    debug!(prefix, total, "composed WHO-HAS");
    Ok(total)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Result<u8, NsError> {
        let b = *self.data.get(self.pos).ok_or(NsError::EndOfData)?;
        self.pos += 1;
        Ok(b)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], NsError> {
        let s = self.data.get(self.pos..self.pos + n).ok_or(NsError::EndOfData)?;
        self.pos += n;
        Ok(s)
    }

    fn skip(&mut self, n: usize) -> Result<(), NsError> {
        if self.pos + n > self.data.len() {
            return Err(NsError::EndOfData);
        }
        self.pos += n;
        Ok(())
    }

    fn at_or_past_end(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// Parses an IS-AT packet, looking for the first answer with at least one
/// name matching `prefix` by prefix.
///
/// # Errors
///
/// Returns [`NsError::NoMatch`] if the packet parses cleanly but no answer
/// matches (including an unrecognized protocol version, silently ignored
/// per the wire format's forward-compatibility rule). Returns
/// [`NsError::Invalid`] for a question/answer of the wrong message type, or
/// an answer with neither `R4_FLAG` nor `R6_FLAG`. Returns
/// [`NsError::EndOfData`] if a block runs past the end of `data`.
pub fn parse_is_at(data: &[u8], prefix: &str) -> Result<DiscoveredService, NsError> {
    let mut c = Cursor { data, pos: 0 };
    let version = c.u8()?;
    let mut q_count = c.u8()?;
    let mut a_count = c.u8()?;
    let _ttl = c.u8()?;

    if msg_version(version) != MSG_V1 {
        return Err(NsError::NoMatch);
    }

    while q_count > 0 {
        q_count -= 1;
        let flags = c.u8()?;
        if msg_type(flags) != WHO_HAS_MSG {
            return Err(NsError::Invalid);
        }
        let mut name_count = c.u8()?;
        while name_count > 0 {
            name_count -= 1;
            let sz = usize::from(c.u8()?);
            c.skip(sz)?;
        }
    }

    while a_count > 0 {
        a_count -= 1;
        let flags = c.u8()?;
        if msg_type(flags) != IS_AT_MSG {
            return Err(NsError::Invalid);
        }
        if flags & (R4_FLAG | R6_FLAG) == 0 {
            return Err(NsError::NoMatch);
        }
        let mut name_count = c.u8()?;

        let mask_bytes = c.bytes(2)?;
        let transport_mask = u16::from_be_bytes([mask_bytes[0], mask_bytes[1]]);

        let mut service = DiscoveredService { transport_mask, ..DiscoveredService::default() };

        if flags & R4_FLAG != 0 {
            let addr = c.bytes(4)?;
            service.ipv4.copy_from_slice(addr);
            let port = c.bytes(2)?;
            service.ipv4_port = u16::from_be_bytes([port[0], port[1]]);
            service.addr_types.ipv4 = true;
        }
        if flags & U4_FLAG != 0 {
            c.skip(4 + 2)?;
        }
        if flags & R6_FLAG != 0 {
            let addr = c.bytes(16)?;
            service.ipv6.copy_from_slice(addr);
            let port = c.bytes(2)?;
            service.ipv6_port = u16::from_be_bytes([port[0], port[1]]);
            service.addr_types.ipv6 = true;
        }
        if flags & U6_FLAG != 0 {
            c.skip(16 + 2)?;
        }
        if flags & G_FLAG != 0 {
            let sz = usize::from(c.u8()?);
            c.skip(sz)?;
        }
        if c.at_or_past_end() {
            return Err(NsError::EndOfData);
        }

        let mut matched = None;
        while name_count > 0 {
            name_count -= 1;
            let sz = usize::from(c.u8()?);
            let name = c.bytes(sz)?;
            if prefix.len() <= sz && &name[..prefix.len()] == prefix.as_bytes() {
                matched = Some(service);
                break;
            }
        }
        if let Some(found) = matched {
            debug!(prefix, transport_mask, "IS-AT match found");
            return Ok(found);
        }
    }

    Err(NsError::NoMatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_who_has_matches_scenario_s4() {
        let mut buf = [0u8; 16];
        let n = compose_who_has(&mut buf, "foo").expect("fits");
        assert_eq!(&buf[..n], &[0x11, 0x01, 0x00, 0x00, 0x80, 0x01, 0x04, b'f', b'o', b'o', b'*']);
    }

    #[test]
    fn compose_who_has_rejects_buffer_too_small() {
        let mut buf = [0u8; 5];
        let err = compose_who_has(&mut buf, "foo").unwrap_err();
        assert_eq!(err, NsError::Resources { needed: 11 });
    }

    fn is_at_packet(prefix_name: &str) -> Vec<u8> {
        let mut buf = vec![0x11, 0x00, 0x01, 0x00]; // version, qCount=0, aCount=1, ttl
        buf.push(IS_AT_MSG | R4_FLAG);
        buf.push(1); // nameCount
        buf.extend_from_slice(&0x0004u16.to_be_bytes());
        buf.extend_from_slice(&[192, 168, 1, 10]);
        buf.extend_from_slice(&9955u16.to_be_bytes());
        buf.push(prefix_name.len() as u8);
        buf.extend_from_slice(prefix_name.as_bytes());
        buf
    }

    #[test]
    fn parse_is_at_matches_testable_property_9() {
        let packet = is_at_packet("org.alljoyn.Bus.sample");
        let found = parse_is_at(&packet, "org.alljoyn.Bus").expect("matches");
        assert_eq!(found.transport_mask, 0x0004);
        assert!(found.addr_types.ipv4);
        assert!(!found.addr_types.ipv6);
        assert_eq!(found.ipv4, [192, 168, 1, 10]);
        assert_eq!(found.ipv4_port, 9955);
    }

    #[test]
    fn parse_is_at_no_match_for_unrelated_prefix() {
        let packet = is_at_packet("org.alljoyn.Bus.sample");
        let err = parse_is_at(&packet, "com.example").unwrap_err();
        assert_eq!(err, NsError::NoMatch);
    }

    #[test]
    fn parse_is_at_rejects_unknown_version_as_no_match() {
        let mut packet = is_at_packet("org.alljoyn.Bus.sample");
        packet[0] = 0x20; // version 0, NS version 2: msg version nibble != MSG_V1
        let err = parse_is_at(&packet, "org.alljoyn.Bus").unwrap_err();
        assert_eq!(err, NsError::NoMatch);
    }

    #[test]
    fn parse_is_at_truncated_packet_is_end_of_data() {
        let packet = is_at_packet("org.alljoyn.Bus.sample");
        let err = parse_is_at(&packet[..packet.len() - 2], "org.alljoyn.Bus").unwrap_err();
        assert_eq!(err, NsError::EndOfData);
    }

    /// Two names in one answer, the first matching and the second claiming
    /// a length that runs past the end of the packet. Parsing must stop at
    /// the first match rather than keep walking the name list, so the
    /// second name's truncation never gets a chance to surface.
    #[test]
    fn parse_is_at_stops_at_first_match_ignoring_later_malformed_names() {
        let mut buf = vec![0x11, 0x00, 0x01, 0x00]; // version, qCount=0, aCount=1, ttl
        buf.push(IS_AT_MSG | R4_FLAG);
        buf.push(2); // nameCount
        buf.extend_from_slice(&0x0004u16.to_be_bytes());
        buf.extend_from_slice(&[192, 168, 1, 10]);
        buf.extend_from_slice(&9955u16.to_be_bytes());
        let name = "org.alljoyn.Bus.sample";
        buf.push(name.len() as u8);
        buf.extend_from_slice(name.as_bytes());
        buf.push(200); // second name claims 200 bytes, far past the packet end

        let found = parse_is_at(&buf, "org.alljoyn.Bus").expect("matches on first name");
        assert_eq!(found.ipv4_port, 9955);
    }
}
