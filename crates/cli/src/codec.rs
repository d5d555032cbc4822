//! JSON `Codec` (spec §4.3, §6): the transport this CLI uses for program
//! files, the resume log, and the wire format sent to the oracle process.
//! The engine's own model types carry `serde` derives for exactly this.

use syzmini_engine::model::Program;
use syzmini_engine::oracle::Codec;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn serialize(&self, program: &Program) -> Vec<u8> {
        serde_json::to_vec(program).expect("Program serializes to JSON without error")
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Program, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syzmini_engine::model::test_fixtures::two_resource_program;

    #[test]
    fn round_trips_a_program() {
        let prog = two_resource_program();
        let codec = JsonCodec;
        let bytes = codec.serialize(&prog);
        let back = codec.deserialize(&bytes).unwrap();
        assert_eq!(prog, back);
    }
}
