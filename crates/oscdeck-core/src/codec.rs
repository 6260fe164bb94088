//! OSC wire codec
//!
//! Thin layer over `rosc` pinned to the subset this system speaks: one
//! address pattern plus at most one scalar argument. Bundles are unwrapped
//! to their first contained message, without timetag scheduling.

use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};

use crate::error::{CoreError, Result};
use crate::value::OscArg;

/// Sentinel address substituted when a caller supplies an empty address
pub const EMPTY_ADDRESS: &str = "/EmptyAddress";

/// A decoded OSC message, reduced to the scalar subset
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// OSC address pattern
    pub address: String,
    /// First argument, when it is a supported scalar
    pub arg: Option<OscArg>,
}

/// Encode an address and one scalar argument into OSC wire bytes
pub fn encode(address: &str, arg: &OscArg) -> Result<Vec<u8>> {
    let addr = if address.is_empty() {
        EMPTY_ADDRESS.to_string()
    } else {
        address.to_string()
    };
    let packet = OscPacket::Message(OscMessage {
        addr,
        args: vec![arg_to_osc(arg)],
    });
    encoder::encode(&packet).map_err(|e| CoreError::EncodeError {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Decode OSC wire bytes into an address and optional scalar argument
pub fn decode(bytes: &[u8]) -> Result<DecodedMessage> {
    let (_, packet) = decoder::decode_udp(bytes).map_err(|e| CoreError::DecodeError {
        len: bytes.len(),
        reason: e.to_string(),
    })?;
    let msg = first_message(packet)?;
    let arg = first_arg(&msg.args);
    Ok(DecodedMessage {
        address: msg.addr,
        arg,
    })
}

/// Unwrap a packet to its first message, descending through bundles
fn first_message(packet: OscPacket) -> Result<OscMessage> {
    match packet {
        OscPacket::Message(msg) => Ok(msg),
        OscPacket::Bundle(bundle) => {
            let inner = bundle
                .content
                .into_iter()
                .next()
                .ok_or(CoreError::EmptyBundle)?;
            first_message(inner)
        }
    }
}

fn arg_to_osc(arg: &OscArg) -> OscType {
    match arg {
        OscArg::Float(f) => OscType::Float(*f),
        OscArg::Int(i) => OscType::Int(*i),
        OscArg::Bool(b) => OscType::Bool(*b),
        OscArg::Text(s) => OscType::String(s.clone()),
    }
}

/// Map the first rosc argument onto the supported scalar set.
///
/// Wider numeric types are narrowed; anything else (blobs, colors, arrays)
/// yields no argument so the address remains observable.
fn first_arg(args: &[OscType]) -> Option<OscArg> {
    match args.first()? {
        OscType::Float(f) => Some(OscArg::Float(*f)),
        OscType::Double(d) => Some(OscArg::Float(*d as f32)),
        OscType::Int(i) => Some(OscArg::Int(*i)),
        OscType::Long(l) => Some(OscArg::Int(*l as i32)),
        OscType::Bool(b) => Some(OscArg::Bool(*b)),
        OscType::String(s) => Some(OscArg::Text(s.clone())),
        _ => None,
    }
}
