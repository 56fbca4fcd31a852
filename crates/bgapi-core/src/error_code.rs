//! BGAPI 16-bit error-code space
//!
//! Codes are partitioned by their leading byte: `0x01xx` API misuse,
//! `0x02xx` Bluetooth link-layer, `0x03xx` Security Manager, `0x04xx`
//! Attribute Protocol. `0x0000` means success. The descriptions below
//! are the module vendor's canonical strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A result/reason word from a response or event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    pub const SUCCESS: ErrorCode = ErrorCode(0x0000);

    /// Disconnect reason reported when the host itself tore the link
    /// down. Used to suppress connection-lost notifications.
    pub const LOCAL_TERMINATION: ErrorCode = ErrorCode(0x0216);

    /// Remote user terminated the connection.
    pub const REMOTE_TERMINATION: ErrorCode = ErrorCode(0x0213);

    /// ATT invalid handle, the canonical write-failure code.
    pub const ATT_INVALID_HANDLE: ErrorCode = ErrorCode(0x0401);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Fold a result word into a `Result`, keeping the code on failure.
    pub fn into_result(self) -> Result<(), ErrorCode> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Vendor description for a known code, None otherwise.
    pub fn known_description(self) -> Option<&'static str> {
        let text = match self.0 {
            0x0000 => "Success.",

            // API errors (0x01xx)
            0x0180 => "Command contained invalid parameter.",
            0x0181 => "Device is in wrong state to receive command.",
            0x0182 => "Device has run out of memory.",
            0x0183 => "Feature is not implemented.",
            0x0184 => "Command was not recognized.",
            0x0185 => "Command or Procedure failed due to timeout.",
            0x0186 => "Connection handle passed is to command is not a valid handle.",
            0x0187 => "Command would cause either underflow or overflow error.",
            0x0188 => "User attribute was accessed through API which is not supported.",
            0x0189 => "No valid license key found.",
            0x018a => "Command maximum length exceeded.",
            0x018b => "Bonding procedure can't be started because device has no space left for bond.",

            // Bluetooth link-layer errors (0x02xx)
            0x0205 => "Pairing or authentication failed due to incorrect results in the pairing or authentication procedure.",
            0x0206 => "Pairing failed because of missing PIN, or authentication failed because of missing Key.",
            0x0207 => "Controller is out of memory.",
            0x0208 => "Link supervision timeout has expired.",
            0x0209 => "Controller is at limit of connections it can support.",
            0x020c => "Command requested cannot be executed because the Controller is in a state where it cannot process this command at this time.",
            0x0212 => "Command contained invalid parameters.",
            0x0213 => "User on the remote device terminated the connection.",
            0x0216 => "Local device terminated the connection.",
            0x0222 => "Connection terminated due to link-layer procedure timeout.",
            0x0228 => "Received link-layer control packet where instant was in the past.",
            0x023a => "Operation was rejected because the controller is busy and unable to process the request.",
            0x023b => "The Unacceptable Connection Interval error code indicates that the remote device terminated the connection because of an unacceptable connection interval.",
            0x023c => "Directed advertising completed without a connection being created.",
            0x023d => "Connection was terminated because the Message Integrity Check (MIC) failed on a received packet.",
            0x023e => "LL initiated a connection but the connection has failed to be established.",

            // Security Manager errors (0x03xx)
            0x0301 => "The user input of passkey failed, for example, the user cancelled the operation.",
            0x0302 => "Out of Band data is not available for authentication.",
            0x0303 => "The pairing procedure cannot be performed as authentication requirements cannot be met due to IO capabilities of one or both devices.",
            0x0304 => "The confirm value does not match the calculated compare value.",
            0x0305 => "Pairing is not supported by the device.",
            0x0306 => "The resultant encryption key size is insufficient for the security requirements of this device.",
            0x0307 => "The SMP command received is not supported on this device.",
            0x0308 => "Pairing failed due to an unspecified reason.",
            0x0309 => "Pairing or authentication procedure is disallowed because too little time has elapsed since last pairing request or security request.",
            0x030a => "The Invalid Parameters error code indicates that the command length is invalid or that a parameter is outside of the specified range.",

            // Attribute Protocol errors (0x04xx)
            0x0401 => "The attribute handle given was not valid on this server.",
            0x0402 => "The attribute cannot be read.",
            0x0403 => "The attribute cannot be written.",
            0x0404 => "The attribute PDU was invalid.",
            0x0405 => "The attribute requires authentication before it can be read or written.",
            0x0406 => "Attribute Server does not support the request received from the client.",
            0x0407 => "Offset specified was past the end of the attribute.",
            0x0408 => "The attribute requires authorization before it can be read or written.",
            0x0409 => "Too many prepare writes have been queued.",
            0x040a => "No attribute found within the given attribute handle range.",
            0x040b => "The attribute cannot be read or written using the Read Blob Request.",
            0x040c => "The Encryption Key Size used for encrypting this link is insufficient.",
            0x040d => "The attribute value length is invalid for the operation.",
            0x040e => "The attribute request that was requested has encountered an error that was unlikely, and therefore could not be completed as requested.",
            0x040f => "The attribute requires encryption before it can be read or written.",
            0x0410 => "The attribute type is not a supported grouping attribute as defined by a higher layer specification.",
            0x0411 => "Insufficient Resources to complete the request.",
            0x0480 => "Application error code defined by a higher layer specification.",
            _ => return None,
        };
        Some(text)
    }

    /// Human-readable description, falling back to the unknown-code form.
    pub fn description(self) -> String {
        match self.known_description() {
            Some(text) => text.to_string(),
            None => format!("Unknown error with code: {}", self.0),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}: {}", self.0, self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_ok() {
        assert!(ErrorCode::SUCCESS.is_success());
        assert_eq!(ErrorCode(0x0000).into_result(), Ok(()));
    }

    #[test]
    fn known_codes_use_vendor_text() {
        assert_eq!(
            ErrorCode(0x0401).description(),
            "The attribute handle given was not valid on this server."
        );
        assert_eq!(
            ErrorCode(0x0216).description(),
            "Local device terminated the connection."
        );
    }

    #[test]
    fn unknown_codes_render_the_fallback() {
        assert_eq!(
            ErrorCode(0x9999).description(),
            format!("Unknown error with code: {}", 0x9999)
        );
    }
}
