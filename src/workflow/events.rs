//! Receipt log decoding.

use ethers::{
    abi::{Event, RawLog},
    types::Address,
};

use crate::core::domain::{EventRecord, LogEntry};
use crate::core::errors::WorkflowError;

/// Lazily decodes the logs of one contract that match one event name.
///
/// Logs from other addresses, or whose first topic is not the signature of
/// any overload of the event, are skipped. A matching log that fails to
/// decode yields a `WorkflowError::Decoding` item and iteration continues.
pub struct EventIter<'a> {
    events: &'a [Event],
    address: Address,
    logs: std::slice::Iter<'a, LogEntry>,
}

impl<'a> EventIter<'a> {
    pub(crate) fn new(events: &'a [Event], address: Address, logs: &'a [LogEntry]) -> Self {
        Self { events, address, logs: logs.iter() }
    }
}

impl<'a> Iterator for EventIter<'a> {
    type Item = Result<EventRecord, WorkflowError>;

    fn next(&mut self) -> Option<Self::Item> {
        for log in self.logs.by_ref() {
            if log.address != self.address {
                continue;
            }
            let topic0 = match log.topics.first() {
                Some(t) => *t,
                None => continue,
            };
            // anonymous events carry no signature topic and cannot be matched
            let event = match self
                .events
                .iter()
                .find(|e| !e.anonymous && e.signature() == topic0)
            {
                Some(e) => e,
                None => continue,
            };
            return Some(decode_log(event, log));
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.logs.size_hint().1)
    }
}

fn decode_log(event: &Event, log: &LogEntry) -> Result<EventRecord, WorkflowError> {
    let raw = RawLog { topics: log.topics.clone(), data: log.data.to_vec() };
    let parsed = event.parse_log(raw).map_err(|e| {
        WorkflowError::Decoding(format!(
            "log {:?} does not decode as {}: {}",
            log.log_index, event.name, e
        ))
    })?;
    Ok(EventRecord {
        name: event.name.clone(),
        address: log.address,
        log_index: log.log_index,
        params: parsed.params.into_iter().map(|p| (p.name, p.value)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::{
        abi::{AbiParser, Token},
        types::{Bytes, H256, U256},
    };

    fn minted() -> Event {
        AbiParser::default()
            .parse_event("event Minted(address indexed to, uint256 amount)")
            .unwrap()
    }

    fn minted_log(contract: Address, to: Address, amount: u64, index: u64) -> LogEntry {
        LogEntry {
            address: contract,
            topics: vec![minted().signature(), H256::from(to)],
            data: Bytes::from(ethers::abi::encode(&[Token::Uint(U256::from(amount))])),
            log_index: Some(index),
        }
    }

    #[test]
    fn test_decodes_matching_logs_in_order() {
        let events = vec![minted()];
        let contract = Address::repeat_byte(0xc0);
        let logs = vec![
            minted_log(contract, Address::repeat_byte(1), 5, 0),
            minted_log(Address::repeat_byte(0xdd), Address::repeat_byte(2), 6, 1),
            minted_log(contract, Address::repeat_byte(3), 7, 2),
        ];
        let records: Vec<_> =
            EventIter::new(&events, contract, &logs).collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].param("amount"), Some(&Token::Uint(U256::from(5))));
        assert_eq!(records[1].param("to"), Some(&Token::Address(Address::repeat_byte(3))));
        assert_eq!(records[1].log_index, Some(2));
    }

    #[test]
    fn test_skips_foreign_topics() {
        let events = vec![minted()];
        let contract = Address::repeat_byte(0xc0);
        let logs = vec![LogEntry {
            address: contract,
            topics: vec![H256::repeat_byte(9)],
            data: Bytes::new(),
            log_index: Some(0),
        }];
        assert_eq!(EventIter::new(&events, contract, &logs).count(), 0);
    }

    #[test]
    fn test_truncated_data_is_decoding_error() {
        let events = vec![minted()];
        let contract = Address::repeat_byte(0xc0);
        let mut log = minted_log(contract, Address::repeat_byte(1), 5, 0);
        log.data = Bytes::from(vec![0u8; 3]);
        let logs = vec![log];
        let items: Vec<_> = EventIter::new(&events, contract, &logs).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(WorkflowError::Decoding(_))));
    }
}
