// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

use warc_codec::header::*;
use warc_codec::{records_from_bytes, CdxFormat, Compression, Reader, Record, RecordType, Writer, WriterConfig};

const DATE: &str = "2000-01-01T00:00:00Z";

fn capture(uri: &str, request: &[u8], response: &[u8]) -> Vec<Record> {
    let mut req = Record::new(RecordType::Request);
    req.init_headers(RecordType::Request, None);
    req.headers_mut().set(WARC_DATE, DATE);
    req.headers_mut().set(WARC_TARGET_URI, uri);
    req.set_content(request);

    let mut resp = Record::new(RecordType::Response);
    resp.init_headers(RecordType::Response, None);
    resp.headers_mut().set(WARC_DATE, DATE);
    resp.headers_mut().set(WARC_TARGET_URI, uri);
    resp.headers_mut().set(WARC_IP_ADDRESS, "93.184.216.34");
    resp.set_content(response);

    vec![req, resp]
}

fn archive() -> Vec<Record> {
    let mut info = Record::new(RecordType::WarcInfo);
    info.init_headers(RecordType::WarcInfo, None);
    info.headers_mut().set(WARC_DATE, DATE);
    info.set_content(&b"software: warc-codec\r\n"[..]);

    let mut records = vec![info];
    records.extend(capture(
        "http://example.com/",
        b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n",
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello",
    ));
    records.extend(capture(
        "https://www.Example.com/Old/?b=1&a=2",
        b"GET /Old/?b=1&a=2 HTTP/1.1\r\nHost: www.example.com\r\n\r\n",
        b"HTTP/1.1 301 Moved Permanently\r\nLocation: https://example.com/new\r\nContent-Type: text/html\r\n\r\n",
    ));
    records
}

#[test]
fn test_read_write_index() {
    let mut written = archive();
    let mut writer = Writer::new(Vec::new());
    writer.write_records(written[..3].iter_mut()).unwrap();
    let records = records_from_bytes(writer.get_ref()).unwrap();
    assert_eq!(records.len(), 3);

    let types: Vec<RecordType> = records.iter().map(Record::record_type).collect();
    assert_eq!(types, vec![RecordType::WarcInfo, RecordType::Request, RecordType::Response]);
    assert_eq!(
        records[2].headers().get(WARC_BLOCK_DIGEST),
        Some(warc_codec::sha1_digest(records[2].content()).as_str())
    );

    let format = CdxFormat::parse("a b s").unwrap();
    let mut line = format.empty_line();
    records[2].cdx_line(&format, &mut line).unwrap();
    assert_eq!(line, vec!["http://example.com/", "946684800", "200"]);

    // Requests produce no index line
    let mut line = format.empty_line();
    records[1].cdx_line(&format, &mut line).unwrap();
    assert_eq!(line, vec!["-", "-", "-"]);
}

#[test]
fn test_index_while_writing() {
    let format = CdxFormat::parse(" CDX N b a m s k r M S V g").unwrap();
    let lines = Rc::new(RefCell::new(Vec::new()));

    let config = WriterConfig {
        compression: Compression::Gzip,
        ..Default::default()
    };
    let mut writer = Writer::seekable_with_config(Cursor::new(Vec::new()), config);
    let sink = Rc::clone(&lines);
    let cdx = format.clone();
    writer.on_record(move |record, span| {
        if record.record_type() != RecordType::Response {
            return;
        }
        let mut line = cdx.empty_line();
        record.cdx_line(&cdx, &mut line).unwrap();
        cdx.fill_location(&mut line, "example.warc.gz", span, true);
        sink.borrow_mut().push(line.join(" "));
    });
    writer.write_records(archive().iter_mut()).unwrap();
    let data = writer.into_inner().into_inner();

    let lines = lines.borrow();
    assert_eq!(lines.len(), 2);

    let first: Vec<&str> = lines[0].split(' ').collect();
    assert_eq!(first[..8], ["com,example)/", "946684800", "http://example.com/", "text/plain", "200", "-", "-", "-"]);
    assert_eq!(first[10], "example.warc.gz");

    let second: Vec<&str> = lines[1].split(' ').collect();
    assert_eq!(second[0], "com,example)/old?a=2&b=1");
    assert_eq!(second[3], "text/html");
    assert_eq!(second[4], "301");
    assert_eq!(second[6], "https://example.com/new");

    // Compressed size and offset point at a readable gzip member
    let length: usize = second[8].parse().unwrap();
    let offset: usize = second[9].parse().unwrap();
    let member = &data[offset..offset + length];
    let record = Reader::new(member).unwrap().read().unwrap().unwrap();
    assert_eq!(record.target_uri(), Some("https://www.Example.com/Old/?b=1&a=2"));
    assert_eq!(record.record_type(), RecordType::Response);
}
