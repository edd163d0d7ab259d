//! AMF0 command-message framing (`connect`/`createStream`/`publish`/`play`/
//! `_result`/`onStatus`), the payload carried by [`crate::rtmp::message::
//! Event::Command`].

use crate::rtmp::amf::AmfValue;

/// One decoded AMF0 command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub command_object: AmfValue,
    pub arguments: Vec<AmfValue>,
}

impl Command {
    pub fn new(name: impl Into<String>, transaction_id: f64, command_object: AmfValue, arguments: Vec<AmfValue>) -> Self {
        Self {
            name: name.into(),
            transaction_id,
            command_object,
            arguments,
        }
    }

    /// Decode `name, transaction_id, command_object, [args...]` off the
    /// front of an already AMF0-decoded value list.
    pub fn from_values(mut values: Vec<AmfValue>) -> Option<Self> {
        if values.len() < 2 {
            return None;
        }
        let arguments = if values.len() > 3 { values.split_off(3) } else { Vec::new() };
        let mut it = values.into_iter();
        let name = match it.next()? {
            AmfValue::String(s) => s,
            _ => return None,
        };
        let transaction_id = match it.next()? {
            AmfValue::Number(n) => n,
            _ => return None,
        };
        let command_object = it.next().unwrap_or(AmfValue::Null);
        Some(Self { name, transaction_id, command_object, arguments })
    }

    pub fn into_values(self) -> Vec<AmfValue> {
        let mut values = vec![AmfValue::String(self.name), AmfValue::Number(self.transaction_id), self.command_object];
        values.extend(self.arguments);
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_values() {
        let cmd = Command::new("connect", 1.0, AmfValue::Null, vec![AmfValue::String("live".into())]);
        let values = cmd.clone().into_values();
        let back = Command::from_values(values).unwrap();
        assert_eq!(back, cmd);
    }
}
