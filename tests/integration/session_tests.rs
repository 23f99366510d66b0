//! End-to-end tests of the operation table against the scripted fake engine.

use super::test_utils::*;

use slide_bridge::adapter::PhysicalSizes;
use slide_bridge::pixel::PixelType;
use slide_bridge::{MetadataStore, OP_OK, SENTINEL_FAILURE, SENTINEL_OVERFLOW};

// =============================================================================
// Open / Close Lifecycle
// =============================================================================

#[test]
fn test_open_then_current_file_returns_exact_name() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    assert_eq!(open_by_name(&mut session, &buffer, "/data/a.svs"), OP_OK);
    assert_eq!(session.is_any_file_open(), 1);

    let len = session.get_current_file();
    assert_eq!(read_string(&buffer, len), "/data/a.svs");
}

#[test]
fn test_open_unknown_file_fails_and_stays_closed() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    assert_eq!(
        open_by_name(&mut session, &buffer, "/data/missing.svs"),
        SENTINEL_FAILURE
    );
    assert_eq!(session.is_any_file_open(), 0);
    assert!(read_error(&session, &buffer).contains("Unsupported format"));
}

#[test]
fn test_opening_second_file_leaves_no_trace_of_first() {
    let mut slide_a = FakeSlide::default();
    slide_a.format = "Format A".into();
    slide_a.companions = vec!["/data/a.dat".into()];
    let mut slide_b = FakeSlide::default();
    slide_b.format = "Format B".into();

    let opener = FakeOpener::new()
        .with_slide("/data/a.svs", slide_a)
        .with_slide("/data/b.svs", slide_b);
    let (mut session, buffer) = session_with(opener, 64 * 1024);

    assert_eq!(open_by_name(&mut session, &buffer, "/data/a.svs"), OP_OK);
    assert_eq!(open_by_name(&mut session, &buffer, "/data/b.svs"), OP_OK);

    let len = session.get_current_file();
    assert_eq!(read_string(&buffer, len), "/data/b.svs");

    let len = session.get_format();
    assert_eq!(read_string(&buffer, len), "Format B");

    let len = session.get_used_files();
    let listing = read_string(&buffer, len);
    assert!(!listing.contains("a.svs"));
    assert!(!listing.contains("a.dat"));
}

#[test]
fn test_close_is_idempotent_and_resets_selection() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");
    assert_eq!(session.set_resolution(1), OP_OK);

    assert_eq!(session.close(), OP_OK);
    assert_eq!(session.is_any_file_open(), 0);
    assert_eq!(session.current_resolution(), 0);
    assert_eq!(session.close(), OP_OK);
}

#[test]
fn test_rebinding_routes_results_to_the_new_buffer_only() {
    let (mut session, first) = single_slide_session("/data/a.svs");
    assert_eq!(open_by_name(&mut session, &first, "/data/a.svs"), OP_OK);

    let second = slide_bridge::SharedBuffer::with_capacity(4096);
    session.bind_buffer(second.clone());

    let len = session.get_format();
    assert_eq!(read_string(&second, len), "Fake Format");
    // The previous buffer still holds the request bytes, untouched
    assert_eq!(
        first.read_response("/data/a.svs".len()).unwrap(),
        b"/data/a.svs"
    );

    // Subsequent requests go through the new buffer
    second.write_request(b"/data/a.svs").unwrap();
    assert_eq!(session.is_compatible(11), 1);
}

#[test]
fn test_is_compatible_never_leaves_session_open() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    buffer.write_request(b"/data/a.svs").unwrap();
    assert_eq!(session.is_compatible(11), 1);
    assert_eq!(session.is_any_file_open(), 0);

    buffer.write_request(b"/data/other.bin").unwrap();
    assert_eq!(session.is_compatible(15), 0);
    assert_eq!(session.is_any_file_open(), 0);
}

#[test]
fn test_is_single_file_probes_and_leaves_closed() {
    let mut slide = FakeSlide::default();
    slide.single_file = false;
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);

    open_by_name(&mut session, &buffer, "/data/a.svs");
    buffer.write_request(b"/data/a.svs").unwrap();
    assert_eq!(session.is_single_file(11), 0);
    assert_eq!(session.is_any_file_open(), 0);
}

// =============================================================================
// Wire Protocol
// =============================================================================

#[test]
fn test_used_files_are_null_separated_with_counted_terminator() {
    let mut slide = FakeSlide::default();
    slide.companions = vec!["/data/a.dat".into(), "/data/a.idx".into()];
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);
    open_by_name(&mut session, &buffer, "/data/a.svs");

    let expected = "/data/a.svs\0/data/a.dat\0/data/a.idx\0";
    let len = session.get_used_files();
    assert_eq!(len as usize, expected.len());
    assert_eq!(read_string(&buffer, len), expected);
}

#[test]
fn test_dimension_order_is_five_bytes() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    let len = session.get_dimension_order();
    assert_eq!(len, 5);
    assert_eq!(read_string(&buffer, len), "XYCZT");
}

#[test]
fn test_scalar_queries_answer_for_the_default_slide() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.get_series_count(), 1);
    assert_eq!(session.get_resolution_count(), 2);
    assert_eq!(session.get_size_x(), 64);
    assert_eq!(session.get_size_y(), 64);
    assert_eq!(session.get_size_c(), 1);
    assert_eq!(session.get_size_z(), 1);
    assert_eq!(session.get_size_t(), 1);
    assert_eq!(session.get_effective_size_c(), 1);
    assert_eq!(session.get_image_count(), 1);
    assert_eq!(session.get_pixel_type(), PixelType::UInt8.code());
    assert_eq!(session.get_bytes_per_pixel(), 1);
    assert_eq!(session.get_bits_per_pixel(), 8);
    assert_eq!(session.get_rgb_channel_count(), 1);
    assert_eq!(session.is_rgb(), 0);
    assert_eq!(session.is_interleaved(), 1);
    assert_eq!(session.is_little_endian(), 1);
    assert_eq!(session.is_indexed_color(), 0);
    assert_eq!(session.is_false_color(), 0);
    assert_eq!(session.is_order_certain(), 1);
    assert_eq!(session.get_optimal_tile_width(), 256);
    assert_eq!(session.get_optimal_tile_height(), 256);
}

// =============================================================================
// Series and Resolution Selection
// =============================================================================

#[test]
fn test_set_series_resets_resolution() {
    let slide = FakeSlide::with_series(vec![
        FakeSeries::default(),
        FakeSeries {
            resolutions: vec![(32, 48)],
            ..Default::default()
        },
    ]);
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.set_resolution(1), OP_OK);
    assert_eq!(session.current_resolution(), 1);

    assert_eq!(session.set_series(1), OP_OK);
    assert_eq!(session.current_series(), 1);
    assert_eq!(session.current_resolution(), 0);
    assert_eq!(session.get_size_x(), 32);
    assert_eq!(session.get_size_y(), 48);
}

#[test]
fn test_out_of_range_series_fails_and_keeps_selection() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.set_series(7), SENTINEL_FAILURE);
    assert_eq!(session.current_series(), 0);
    let text = read_error(&session, &buffer);
    assert!(text.contains("series index 7 out of range"));
}

#[test]
fn test_resolution_changes_reported_dimensions() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.get_size_x(), 64);
    assert_eq!(session.set_resolution(1), OP_OK);
    assert_eq!(session.get_size_x(), 16);
}

// =============================================================================
// Region Decode
// =============================================================================

#[test]
fn test_open_region_returns_exact_byte_count_and_content() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    let n = session.open_region(1, 2, 3, 2, 2);
    assert_eq!(n, 4);
    let pixels = buffer.read_response(4).unwrap();
    assert_eq!(
        pixels,
        vec![
            region_byte(1, 2, 3),
            region_byte(1, 3, 3),
            region_byte(1, 2, 4),
            region_byte(1, 3, 4),
        ]
    );
}

#[test]
fn test_oversized_region_yields_overflow_sentinel_before_decoding() {
    let (mut session, buffer) = session_with(
        FakeOpener::new().with_slide("/data/a.svs", FakeSlide::default()),
        1024,
    );
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.open_region(0, 0, 0, 64, 64), SENTINEL_OVERFLOW);
    let text = read_error(&session, &buffer);
    assert!(text.contains("4096"));
    assert!(text.contains("1024"));
    // Still open: a failed query leaves the session unchanged
    assert_eq!(session.is_any_file_open(), 1);
}

#[test]
fn test_region_outside_the_plane_is_a_generic_failure() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.open_region(0, 60, 60, 10, 10), SENTINEL_FAILURE);
    assert!(read_error(&session, &buffer).contains("Decode failed"));
}

// =============================================================================
// Thumbnail Decode
// =============================================================================

#[test]
fn test_thumbnail_normalizes_signed_grayscale_to_unsigned_rgb() {
    let slide = FakeSlide::with_series(vec![FakeSeries {
        pixel_type: PixelType::Int8,
        ..Default::default()
    }]);
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);
    open_by_name(&mut session, &buffer, "/data/a.svs");

    let n = session.open_thumbnail(0, 4, 4);
    assert_eq!(n, 4 * 4 * 3);

    // Rendered from the coarsest level (16x16), nearest-neighbor at stride 4,
    // grayscale replicated across 3 channels, sign bit flipped.
    let out = buffer.read_response(n as usize).unwrap();
    let expected_00 = region_byte(0, 0, 0) ^ 0x80;
    let expected_10 = region_byte(0, 4, 0) ^ 0x80;
    assert_eq!(&out[..3], &[expected_00; 3]);
    assert_eq!(&out[3..6], &[expected_10; 3]);
}

#[test]
fn test_thumbnail_moves_current_resolution_to_coarsest() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.current_resolution(), 0);
    assert!(session.open_thumbnail(0, 8, 8) > 0);
    assert_eq!(session.current_resolution(), 1);
    assert_eq!(session.get_size_x(), 16);
}

// =============================================================================
// Lookup Tables
// =============================================================================

#[test]
fn test_8bit_lookup_table_rows_are_concatenated() {
    let slide = FakeSlide::with_series(vec![FakeSeries {
        lut8: Some(vec![vec![0u8; 256], vec![1u8; 256], vec![2u8; 256]]),
        ..Default::default()
    }]);
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.is_indexed_color(), 1);
    let n = session.get_8bit_lookup_table();
    assert_eq!(n, 3 * 256);
    let table = buffer.read_response(n as usize).unwrap();
    assert_eq!(table[0], 0);
    assert_eq!(table[256], 1);
    assert_eq!(table[512], 2);
}

#[test]
fn test_malformed_8bit_row_is_a_generic_failure_not_overflow() {
    let slide = FakeSlide::with_series(vec![FakeSeries {
        lut8: Some(vec![vec![0u8; 256], vec![0u8; 255]]),
        ..Default::default()
    }]);
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.get_8bit_lookup_table(), SENTINEL_FAILURE);
    let text = read_error(&session, &buffer);
    assert!(text.contains("Malformed lookup table"));
    assert!(text.contains("255"));
}

#[test]
fn test_missing_lookup_table_is_reported() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.get_8bit_lookup_table(), SENTINEL_FAILURE);
    assert!(read_error(&session, &buffer).contains("No lookup table"));
}

#[test]
fn test_16bit_lookup_table_is_little_endian() {
    let slide = FakeSlide::with_series(vec![FakeSeries {
        lut16: Some(vec![vec![0x0102u16; 65536], vec![0xA0B0u16; 65536]]),
        ..Default::default()
    }]);
    let (mut session, buffer) = session_with(
        FakeOpener::new().with_slide("/data/a.svs", slide),
        512 * 1024,
    );
    open_by_name(&mut session, &buffer, "/data/a.svs");

    let n = session.get_16bit_lookup_table();
    assert_eq!(n, 2 * 65536 * 2);
    let table = buffer.read_response(n as usize).unwrap();
    assert_eq!(&table[..2], &[0x02, 0x01]);
    assert_eq!(&table[65536 * 2..65536 * 2 + 2], &[0xB0, 0xA0]);
}

#[test]
fn test_malformed_16bit_row_is_a_generic_failure() {
    let slide = FakeSlide::with_series(vec![FakeSeries {
        lut16: Some(vec![vec![0u16; 100]]),
        ..Default::default()
    }]);
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.get_16bit_lookup_table(), SENTINEL_FAILURE);
    let text = read_error(&session, &buffer);
    assert!(text.contains("65536"));
    assert!(text.contains("100"));
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_physical_sizes_match_the_slide_description() {
    let slide = FakeSlide::with_series(vec![
        FakeSeries::default(),
        FakeSeries {
            physical: PhysicalSizes {
                x: Some(1.5),
                y: None,
                z: Some(3.0),
            },
            ..Default::default()
        },
    ]);
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.get_physical_size_x(0), 0.25);
    assert_eq!(session.get_physical_size_y(0), 0.25);
    // Unspecified sizes read as 0.0, distinct from the -1.0 failure value
    assert_eq!(session.get_physical_size_z(0), 0.0);
    assert_eq!(session.get_physical_size_x(1), 1.5);
    assert_eq!(session.get_physical_size_y(1), 0.0);
    assert_eq!(session.get_physical_size_z(1), 3.0);

    assert_eq!(session.get_physical_size_x(5), -1.0);
}

#[test]
fn test_physical_sizes_survive_close_until_next_open() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");
    session.close();

    assert_eq!(session.get_physical_size_x(0), 0.25);
}

#[test]
fn test_metadata_xml_round_trips_through_the_buffer() {
    let slide = FakeSlide::with_series(vec![
        FakeSeries::default(),
        FakeSeries {
            physical: PhysicalSizes {
                x: Some(1.5),
                y: None,
                z: Some(3.0),
            },
            ..Default::default()
        },
    ]);
    let (mut session, buffer) =
        session_with(FakeOpener::new().with_slide("/data/a.svs", slide), 4096);
    open_by_name(&mut session, &buffer, "/data/a.svs");

    let len = session.dump_metadata_xml();
    let xml = read_string(&buffer, len);
    let parsed = MetadataStore::parse_xml(&xml).unwrap();

    assert_eq!(parsed.series_count(), 2);
    assert_eq!(parsed.physical_sizes(0).unwrap().x, Some(0.25));
    assert_eq!(parsed.physical_sizes(1).unwrap().x, Some(1.5));
    assert_eq!(parsed.physical_sizes(1).unwrap().y, None);
    assert_eq!(parsed.physical_sizes(1).unwrap().z, Some(3.0));
}

// =============================================================================
// Error Reporting
// =============================================================================

#[test]
fn test_error_record_is_not_cleared_on_success() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");

    assert_eq!(session.get_size_x(), SENTINEL_FAILURE);
    let len = session.get_last_error_length();
    assert!(len > 0);
    let text = read_string(&buffer, len);
    assert!(text.contains("No file is currently open"));

    // A successful operation leaves the recorded length alone
    assert_eq!(open_by_name(&mut session, &buffer, "/data/a.svs"), OP_OK);
    assert_eq!(session.get_last_error_length(), len);
}

#[test]
fn test_each_failure_overwrites_the_previous_diagnostic() {
    let (mut session, buffer) = single_slide_session("/data/a.svs");
    open_by_name(&mut session, &buffer, "/data/a.svs");

    assert_eq!(session.set_series(9), SENTINEL_FAILURE);
    let first = read_error(&session, &buffer);

    assert_eq!(session.set_resolution(9), SENTINEL_FAILURE);
    let second = read_error(&session, &buffer);

    assert!(first.contains("series"));
    assert!(second.contains("resolution"));
}
