//! AIS payload decoder backed by the `nmea-parser` crate.
//!
//! The library does the six-bit unpacking, scaling and multipart joining.
//! A handful of fields that the library exposes only as enums (navigation
//! status, ship type, ETA components) are read straight from the payload bits
//! so the numeric AIS codes are kept as broadcast.

use aistrack_core::message::{AisDecoder, DecodedAisMessage};
use aistrack_core::nmea::{has_valid_checksum, message_type_of};
use aistrack_core::vessel::clean_text;
use aistrack_core::DecodeError;
use nmea_parser::ais::{
    AidToNavigationReport, BaseStationReport, StandardSarAircraftPositionReport, VesselDynamicData,
    VesselStaticData,
};
use nmea_parser::{NmeaParser, ParsedMessage};

/// Message types handed to the library. Everything else is reported as
/// unsupported without being parsed.
pub const DECODED_MESSAGE_TYPES: [u8; 11] = [1, 2, 3, 4, 5, 9, 18, 19, 21, 24, 27];

/// Shortest payload, in bits, the library will decode without zero-filling
/// fields. Type 5 and 24 allow for the two fill bits senders usually strip.
fn minimum_payload_bits(message_type: u8, bits: &PayloadBits) -> usize {
    match message_type {
        1..=4 | 9 | 18 => 168,
        5 => 420,
        19 => 312,
        21 => 272,
        24 if bits.read(38, 2) == Some(1) => 168,
        24 => 160,
        27 => 96,
        _ => 0,
    }
}

// =============================================================================
// Payload bit access
// =============================================================================

/// Armored payload of a complete message, readable as a bit string
#[derive(Debug, Clone, Default)]
pub struct PayloadBits {
    values: Vec<u8>,
}

impl PayloadBits {
    /// Concatenate the payload fields of all sentences, in order.
    pub fn from_lines(lines: &[String]) -> Self {
        let values = lines
            .iter()
            .filter_map(|line| line.trim().split(',').nth(5))
            .flat_map(|payload| payload.bytes())
            .filter_map(|c| match c {
                b'0'..=b'W' => Some(c - 48),
                b'`'..=b'w' => Some(c - 56),
                _ => None,
            })
            .collect();
        PayloadBits { values }
    }

    pub fn len(&self) -> usize {
        self.values.len() * 6
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Unsigned value of `width` bits starting at bit `start` (MSB first).
    /// `None` if the payload is too short.
    pub fn read(&self, start: usize, width: usize) -> Option<u32> {
        if width == 0 || width > 32 || start + width > self.len() {
            return None;
        }
        let mut value = 0u32;
        for bit in start..start + width {
            let sixbit = self.values[bit / 6];
            let set = (sixbit >> (5 - bit % 6)) & 1;
            value = (value << 1) | u32::from(set);
        }
        Some(value)
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// [`AisDecoder`] on top of [`NmeaParser`].
///
/// The library parser keeps type 24 part A/B pairing state between calls,
/// so one decoder instance lives for the lifetime of the ingestion loop.
pub struct NmeaParserDecoder {
    parser: NmeaParser,
}

impl Default for NmeaParserDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaParserDecoder {
    pub fn new() -> Self {
        NmeaParserDecoder {
            parser: NmeaParser::new(),
        }
    }
}

impl AisDecoder for NmeaParserDecoder {
    fn decode(&mut self, lines: &[String]) -> Result<DecodedAisMessage, DecodeError> {
        let first = lines.first().ok_or(DecodeError::Empty)?;
        let message_type =
            message_type_of(first).ok_or_else(|| DecodeError::Malformed(first.clone()))?;

        if let Some(bad) = lines.iter().find(|line| !has_valid_checksum(line)) {
            return Err(DecodeError::Rejected(format!("checksum mismatch: {}", bad)));
        }
        if !DECODED_MESSAGE_TYPES.contains(&message_type) {
            return Err(DecodeError::Unsupported { message_type });
        }

        let mut parsed = None;
        for line in lines {
            match self.parser.parse_sentence(line.trim()) {
                Ok(ParsedMessage::Incomplete) => {}
                Ok(message) => parsed = Some(message),
                Err(e) => return Err(DecodeError::Rejected(format!("{:?}", e))),
            }
        }

        let parsed = parsed.ok_or(DecodeError::Incomplete)?;

        let bits = PayloadBits::from_lines(lines);
        let minimum = minimum_payload_bits(message_type, &bits);
        if bits.len() < minimum {
            return Err(DecodeError::Rejected(format!(
                "type {} payload has {} bits, needs {}",
                message_type,
                bits.len(),
                minimum
            )));
        }

        let message = match parsed {
            ParsedMessage::VesselDynamicData(vdd) => dynamic_message(message_type, &vdd, &bits),
            ParsedMessage::VesselStaticData(vsd) => static_message(message_type, &vsd, &bits),
            ParsedMessage::BaseStationReport(bsr) => base_station_message(message_type, &bsr),
            ParsedMessage::StandardSarAircraftPositionReport(sar) => {
                sar_aircraft_message(message_type, &sar)
            }
            ParsedMessage::AidToNavigationReport(aton) => {
                aid_to_navigation_message(message_type, &aton)
            }
            _ => return Err(DecodeError::Unsupported { message_type }),
        };

        if message.mmsi == "0" {
            return Err(DecodeError::Rejected(format!(
                "type {} message without MMSI",
                message_type
            )));
        }
        Ok(message)
    }
}

fn base_station_message(message_type: u8, bsr: &BaseStationReport) -> DecodedAisMessage {
    let mut message = DecodedAisMessage::new(bsr.mmsi.to_string(), message_type);
    message.latitude = bsr.latitude;
    message.longitude = bsr.longitude;
    message.position_accuracy = Some(bsr.high_position_accuracy);
    message
}

fn sar_aircraft_message(
    message_type: u8,
    sar: &StandardSarAircraftPositionReport,
) -> DecodedAisMessage {
    let mut message = DecodedAisMessage::new(sar.mmsi.to_string(), message_type);
    message.latitude = sar.latitude;
    message.longitude = sar.longitude;
    message.speed = sar.sog_knots.map(f64::from);
    message.course = sar.cog;
    message.position_accuracy = Some(sar.high_position_accuracy);
    message
}

fn aid_to_navigation_message(message_type: u8, aton: &AidToNavigationReport) -> DecodedAisMessage {
    let mut message = DecodedAisMessage::new(aton.mmsi.to_string(), message_type);
    message.latitude = aton.latitude;
    message.longitude = aton.longitude;
    message
}

fn dynamic_message(
    message_type: u8,
    vdd: &VesselDynamicData,
    bits: &PayloadBits,
) -> DecodedAisMessage {
    let mut message = DecodedAisMessage::new(vdd.mmsi.to_string(), message_type);
    message.latitude = vdd.latitude;
    message.longitude = vdd.longitude;
    message.speed = vdd.sog_knots;
    message.course = vdd.cog;
    message.heading = vdd.heading_true;
    message.turn_rate = vdd.rot;
    message.position_accuracy = Some(vdd.high_position_accuracy);
    message.navigation_status = match message_type {
        1..=3 => bits.read(38, 4),
        27 => bits.read(40, 4),
        // Class B reports carry no navigation status
        _ => None,
    }
    .map(|status| status as u8);
    message
}

fn static_message(
    message_type: u8,
    vsd: &VesselStaticData,
    bits: &PayloadBits,
) -> DecodedAisMessage {
    let mut message = DecodedAisMessage::new(vsd.mmsi.to_string(), message_type);
    message.ship_name = vsd.name.as_deref().and_then(clean_text);
    message.callsign = vsd.call_sign.as_deref().and_then(clean_text);
    message.destination = vsd.destination.as_deref().and_then(clean_text);
    message.imo = vsd.imo_number.filter(|imo| *imo != 0);
    message.draught = vsd.draught10.map(|d| f64::from(d) / 10.0);
    message.to_bow = vsd.dimension_to_bow;
    message.to_stern = vsd.dimension_to_stern;
    message.to_port = vsd.dimension_to_port;
    message.to_starboard = vsd.dimension_to_starboard;

    match message_type {
        5 => {
            message.ship_type = bits.read(232, 8).map(|v| v as u8);
            message.eta_month = bits.read(274, 4).filter(|m| (1..=12).contains(m)).map(|v| v as u8);
            message.eta_day = bits.read(278, 5).filter(|d| *d != 0).map(|v| v as u8);
            message.eta_hour = bits.read(283, 5).filter(|h| *h < 24).map(|v| v as u8);
            message.eta_minute = bits.read(288, 6).filter(|m| *m < 60).map(|v| v as u8);
        }
        24 => {
            // Part B carries the ship type; part A is name only
            if bits.read(38, 2) == Some(1) {
                message.ship_type = bits.read(40, 8).map(|v| v as u8);
            }
        }
        _ => {}
    }
    message.ship_type = message.ship_type.filter(|t| *t != 0);
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use aistrack_core::MessageKind;

    const POSITION: &str = "!AIVDM,1,1,,A,13aDo80P1sPBRQPMfMl:OHLt0000,0*3A";
    const POSITION_NOT_AVAILABLE: &str = "!AIVDM,1,1,,B,13aDo8EP00<tSF0l4Q@>4?wp0000,0*56";
    const MOORED: &str = "!AIVDM,1,1,,A,13@ndh5P000n9lPPwT`002lD0000,0*31";
    const STATIC_PART_1: &str =
        "!AIVDM,2,1,7,B,53@ndh02>?0duQUc800l4E9<f0hTpD0000000016I0jD<5QfNNlSm51DQ0C@,0*10";
    const STATIC_PART_2: &str = "!AIVDM,2,2,7,B,00000000000,2*20";
    const BINARY_BROADCAST: &str = "!AIVDM,1,1,,A,802R3600Gh00000000,4*60";
    const BASE_STATION: &str = "!AIVDM,1,1,,A,403OviQuMGCqWrRO9>E6fE700@GO,0*4D";
    const SAR_AIRCRAFT: &str = "!AIVDM,1,1,,B,91b55wi;hbOS@OdQAC062Ch2089h,0*30";
    const AID_TO_NAVIGATION_1: &str =
        "!AIVDM,2,1,5,B,E1mg=5J1T4W0h97aRh6ba84<h2d;W:Te=eLvH50```q,0*46";
    const AID_TO_NAVIGATION_2: &str = "!AIVDM,2,2,5,B,:D44QDlp0C1DU00,2*36";
    const TRUNCATED_CLASS_B: &str = "!AIVDM,1,1,,A,B,0*64";
    const TRUNCATED_STATIC: &str = "!AIVDM,1,1,,A,53@ndh02>?0du,0*20";
    const ZERO_MMSI: &str = "!AIVDM,1,1,,A,1000000P1sPBRQPMfMl:OHLt0000,0*4B";

    fn lines(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.map(|a| (a - b).abs() < 1e-4).unwrap_or(false)
    }

    #[test]
    fn test_payload_bits() {
        let bits = PayloadBits::from_lines(&lines(&[POSITION]));
        assert_eq!(bits.len(), 168);
        assert_eq!(bits.read(0, 6), Some(1));
        assert_eq!(bits.read(8, 30), Some(244660000));
        assert_eq!(bits.read(38, 4), Some(0));
        assert_eq!(bits.read(165, 4), None);
        assert_eq!(bits.read(0, 0), None);
    }

    #[test]
    fn test_position_report() {
        let mut decoder = NmeaParserDecoder::new();
        let msg = decoder.decode_line(POSITION).unwrap();

        assert_eq!(msg.mmsi, "244660000");
        assert_eq!(msg.message_type, 1);
        assert!(close(msg.latitude, 51.95));
        assert!(close(msg.longitude, 4.05));
        assert!(close(msg.speed, 12.3));
        assert!(close(msg.course, 268.5));
        assert!(close(msg.heading, 270.0));
        assert_eq!(msg.navigation_status, Some(0));
        assert_eq!(msg.position_accuracy, Some(true));
        assert_eq!(msg.ship_name, None);
    }

    #[test]
    fn test_moored_status() {
        let mut decoder = NmeaParserDecoder::new();
        let msg = decoder.decode_line(MOORED).unwrap();
        assert_eq!(msg.mmsi, "219000000");
        assert_eq!(msg.navigation_status, Some(5));
        assert!(close(msg.latitude, 57.66));
    }

    #[test]
    fn test_position_not_available() {
        let mut decoder = NmeaParserDecoder::new();
        let msg = decoder.decode_line(POSITION_NOT_AVAILABLE).unwrap();
        assert_eq!(msg.mmsi, "244660001");
        // Either absent or the raw sentinel; never a usable coordinate
        assert!(msg.latitude.map(|lat| lat > 90.0).unwrap_or(true));
        assert!(msg.longitude.map(|lon| lon > 180.0).unwrap_or(true));
    }

    #[test]
    fn test_static_multipart() {
        let mut decoder = NmeaParserDecoder::new();
        let msg = decoder.decode(&lines(&[STATIC_PART_1, STATIC_PART_2])).unwrap();

        assert_eq!(msg.mmsi, "219000000");
        assert_eq!(msg.message_type, 5);
        assert_eq!(msg.ship_name.as_deref(), Some("MAERSK LINE"));
        assert_eq!(msg.callsign.as_deref(), Some("OXYZ2"));
        assert_eq!(msg.destination.as_deref(), Some("ROTTERDAM"));
        assert_eq!(msg.imo, Some(9321483));
        assert_eq!(msg.ship_type, Some(70));
        assert_eq!(msg.to_bow, Some(200));
        assert_eq!(msg.to_stern, Some(50));
        assert_eq!(msg.to_port, Some(20));
        assert_eq!(msg.to_starboard, Some(12));
        assert!(close(msg.draught, 12.3));
        assert_eq!(msg.eta_month, Some(6));
        assert_eq!(msg.eta_day, Some(3));
        assert_eq!(msg.eta_hour, Some(14));
        assert_eq!(msg.eta_minute, Some(30));
        assert_eq!(msg.latitude, None);
    }

    #[test]
    fn test_base_station_and_sar_aircraft() {
        let mut decoder = NmeaParserDecoder::new();

        let msg = decoder.decode_line(BASE_STATION).unwrap();
        assert_eq!(msg.mmsi, "3669702");
        assert_eq!(msg.message_type, 4);
        assert!(close(msg.latitude, 36.884));
        assert!(close(msg.longitude, -76.352));
        assert_eq!(msg.kind(), MessageKind::Position);

        let msg = decoder.decode_line(SAR_AIRCRAFT).unwrap();
        assert_eq!(msg.mmsi, "111232511");
        assert_eq!(msg.message_type, 9);
        assert!(close(msg.latitude, 58.144));
        assert!(close(msg.longitude, -6.27884));
    }

    #[test]
    fn test_aid_to_navigation() {
        let mut decoder = NmeaParserDecoder::new();
        let msg = decoder
            .decode(&lines(&[AID_TO_NAVIGATION_1, AID_TO_NAVIGATION_2]))
            .unwrap();
        assert_eq!(msg.mmsi, "123456789");
        assert_eq!(msg.message_type, 21);
        assert!(close(msg.latitude, 47.9206183333));
        assert!(close(msg.longitude, -122.698591667));
        assert_eq!(msg.kind(), MessageKind::Position);
    }

    #[test]
    fn test_truncated_payloads_rejected() {
        let mut decoder = NmeaParserDecoder::new();
        for sentence in [TRUNCATED_CLASS_B, TRUNCATED_STATIC, ZERO_MMSI] {
            assert!(
                matches!(decoder.decode_line(sentence), Err(DecodeError::Rejected(_))),
                "{}",
                sentence
            );
        }
        assert!(decoder.decode_line(POSITION).is_ok());
    }

    #[test]
    fn test_incomplete_set() {
        let mut decoder = NmeaParserDecoder::new();
        assert_eq!(
            decoder.decode(&lines(&[STATIC_PART_1])),
            Err(DecodeError::Incomplete)
        );
    }

    #[test]
    fn test_rejections() {
        let mut decoder = NmeaParserDecoder::new();
        assert_eq!(decoder.decode(&[]), Err(DecodeError::Empty));

        let corrupted = POSITION.replace("*3A", "*3B");
        assert!(matches!(
            decoder.decode_line(&corrupted),
            Err(DecodeError::Rejected(_))
        ));

        assert!(matches!(
            decoder.decode_line("!AIVDM,1,1,,A,,0*00"),
            Err(DecodeError::Malformed(_))
        ));

        assert_eq!(
            decoder.decode_line(BINARY_BROADCAST),
            Err(DecodeError::Unsupported { message_type: 8 })
        );

        // A rejected message does not disturb the next one
        assert!(decoder.decode_line(POSITION).is_ok());
    }
}
