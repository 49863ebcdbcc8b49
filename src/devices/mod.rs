//! Device backend implementations and the open/parse factories.

pub mod deepblu;
pub mod garmin;
pub mod mclean;
pub mod oceans_s1;
pub mod scubapro_g2;
pub mod shearwater;

use crate::config::{BackendKind, DeviceConfig};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::event::EventSink;
use crate::parser::Parser;
use crate::transport::{PacketTransport, Transport};

/// Open a byte-transport backend selected by configuration.
///
/// The Garmin backend ignores `transport` and walks the configured storage
/// directory; the Scubapro G2 needs a packet transport and goes through
/// [`open_packet_device`] instead.
pub fn open_device(
    config: &DeviceConfig,
    transport: Box<dyn Transport>,
    events: Option<EventSink>,
) -> Result<Box<dyn Device>> {
    match config.kind {
        BackendKind::Garmin => {
            Ok(Box::new(garmin::GarminDevice::open(&config.garmin.root, events)?))
        }
        BackendKind::Deepblu => Ok(Box::new(deepblu::DeepbluDevice::open(transport, events)?)),
        BackendKind::OceansS1 => {
            Ok(Box::new(oceans_s1::OceansS1Device::open(transport, events)?))
        }
        BackendKind::Mclean => Ok(Box::new(mclean::McleanDevice::open(
            transport,
            config.mclean.clone(),
            events,
        )?)),
        BackendKind::ScubaproG2 => {
            Err(Error::InvalidArgs("the Scubapro G2 needs a packet transport"))
        }
    }
}

/// Open a packet-transport backend selected by configuration.
pub fn open_packet_device(
    config: &DeviceConfig,
    transport: Box<dyn PacketTransport>,
    events: Option<EventSink>,
) -> Result<Box<dyn Device>> {
    match config.kind {
        BackendKind::ScubaproG2 => Ok(Box::new(scubapro_g2::ScubaproG2Device::open(
            transport,
            config.scubapro.model,
            events,
        )?)),
        _ => Err(Error::InvalidArgs("backend expects a byte transport")),
    }
}

/// Create a parser for one dive downloaded from the given backend.
///
/// The Scubapro G2 delivers Uwatec Smart profile data, whose parser lives
/// outside this crate.
pub fn create_parser<'a>(kind: BackendKind) -> Result<Box<dyn Parser<'a> + 'a>> {
    match kind {
        BackendKind::Garmin => Ok(Box::new(garmin::fit::parser::GarminParser::new())),
        BackendKind::Deepblu => Ok(Box::new(deepblu::parser::DeepbluParser::new())),
        BackendKind::OceansS1 => Ok(Box::new(oceans_s1::parser::OceansS1Parser::new())),
        BackendKind::Mclean => Ok(Box::new(mclean::parser::McleanParser::new())),
        BackendKind::ScubaproG2 => Err(Error::Unsupported("no parser for this backend")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::MockTransport;

    #[test]
    fn test_factory_rejects_transport_kind_mismatch() {
        let config = Config::parse("[device]\nkind = \"scubapro_g2\"\n").unwrap();
        let result = open_device(&config.device, Box::new(MockTransport::new()), None);
        assert!(matches!(result, Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn test_parser_factory_covers_parsing_backends() {
        for kind in [
            BackendKind::Garmin,
            BackendKind::Deepblu,
            BackendKind::OceansS1,
            BackendKind::Mclean,
        ] {
            assert!(create_parser(kind).is_ok());
        }
        assert!(create_parser(BackendKind::ScubaproG2).is_err());
    }
}
