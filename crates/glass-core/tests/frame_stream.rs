use glass_core::frame::{encode_frame, FrameMsg, NdjsonFrameDecoder, PipeFrame, DEFAULT_MAX_FRAME_BYTES};
use glass_core::{ChannelKind, EventData, ListModel};
use serde_json::json;

fn event_frame(seq: u64) -> Vec<u8> {
    let frame = PipeFrame::new(
        ChannelKind::Events,
        FrameMsg::Event(EventData::new(
            format!("salt/job/2026101912000000{seq:04}/new"),
            json!({"fun": "test.ping", "tgt": "*"}),
        )),
    );
    encode_frame(&frame, DEFAULT_MAX_FRAME_BYTES).expect("encode event")
}

fn drain_into(model: &mut ListModel<String>, decoder: &mut NdjsonFrameDecoder<PipeFrame>, chunk: &[u8]) -> usize {
    let report = decoder.push_chunk(chunk);
    for frame in report.frames {
        if let FrameMsg::Event(event) = frame.msg {
            model.insert_at_keep_focus(0, event.tag);
        }
    }
    report.errors.len()
}

#[test]
fn byte_at_a_time_stream_yields_frames_in_write_order() {
    let mut stream = Vec::new();
    for seq in 0..5 {
        stream.extend_from_slice(&event_frame(seq));
    }

    let mut decoder = NdjsonFrameDecoder::<PipeFrame>::default();
    let mut model = ListModel::new();
    let mut errors = 0;
    for byte in &stream {
        errors += drain_into(&mut model, &mut decoder, std::slice::from_ref(byte));
    }

    assert_eq!(errors, 0);
    assert_eq!(model.len(), 5);
    assert_eq!(model.get(0).map(String::as_str), Some("salt/job/20261019120000000004/new"));
    assert_eq!(model.get(4).map(String::as_str), Some("salt/job/20261019120000000000/new"));
    assert_eq!(model.focus(), None);
}

#[test]
fn garbage_between_frames_does_not_disturb_existing_rows() {
    let mut decoder = NdjsonFrameDecoder::<PipeFrame>::default();
    let mut model = ListModel::new();
    model.push_back("pinned".to_string());

    let mut errors = drain_into(&mut model, &mut decoder, &event_frame(1));
    errors += drain_into(&mut model, &mut decoder, b"not json at all\n{\"type\":\"event\"}\n");
    errors += drain_into(&mut model, &mut decoder, &event_frame(2));

    assert_eq!(errors, 2);
    assert_eq!(model.len(), 3);
    assert_eq!(model.focused().map(String::as_str), Some("pinned"));
    assert!(decoder.finish().is_empty());
}
