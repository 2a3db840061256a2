use animtool::*;
use imgref::{ImgRef, ImgVec};
use rgb::{ComponentMap, RGBA8};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const RED: RGBA8 = RGBA8::new(255, 0, 0, 255);
const GREEN: RGBA8 = RGBA8::new(0, 255, 0, 255);
const BLUE: RGBA8 = RGBA8::new(0, 0, 255, 255);

fn solid(w: usize, h: usize, c: RGBA8) -> ImgVec<RGBA8> {
    ImgVec::new(vec![c; w * h], w, h)
}

/// 16×16, every pixel a different opaque color
fn many_colors() -> ImgVec<RGBA8> {
    let px = (0..256).map(|i| RGBA8::new((i % 16 * 16) as u8, (i / 16 * 16) as u8, (i * 7 % 256) as u8, 255)).collect();
    ImgVec::new(px, 16, 16)
}

fn write_gif_fixture(path: &Path, frames: &[(ImgVec<RGBA8>, u16)], repeat: gif::Repeat) {
    let (w, h) = (frames[0].0.width() as u16, frames[0].0.height() as u16);
    let mut enc = gif::Encoder::new(fs::File::create(path).unwrap(), w, h, &[]).unwrap();
    enc.set_repeat(repeat).unwrap();
    for (img, delay) in frames {
        let mut bytes: Vec<u8> = img.pixels().flat_map(|p| [p.r, p.g, p.b, p.a]).collect();
        let mut frame = gif::Frame::from_rgba_speed(w, h, &mut bytes, 10);
        frame.delay = *delay;
        frame.dispose = gif::DisposalMethod::Background;
        enc.write_frame(&frame).unwrap();
    }
}

fn write_apng_fixture(path: &Path, frames: &[ImgVec<RGBA8>], delay_ms: u16) {
    let (w, h) = (frames[0].width() as u32, frames[0].height() as u32);
    let mut enc = png::Encoder::new(fs::File::create(path).unwrap(), w, h);
    enc.set_color(png::ColorType::Rgba);
    enc.set_depth(png::BitDepth::Eight);
    enc.set_animated(frames.len() as u32, 0).unwrap();
    let mut writer = enc.write_header().unwrap();
    for img in frames {
        writer.set_frame_delay(delay_ms, 1000).unwrap();
        let bytes: Vec<u8> = img.pixels().flat_map(|p| [p.r, p.g, p.b, p.a]).collect();
        writer.write_image_data(&bytes).unwrap();
    }
    writer.finish().unwrap();
}

/// Three 20×10 frames: red, green, blue, 100/200/300ms
fn rgb_fixture(dir: &Path) -> PathBuf {
    let path = dir.join("anim.gif");
    write_gif_fixture(&path, &[(solid(20, 10, RED), 10), (solid(20, 10, GREEN), 20), (solid(20, 10, BLUE), 30)], gif::Repeat::Infinite);
    path
}

fn for_each_frame(mut gif_data: &[u8], mut cb: impl FnMut(&gif::Frame, ImgRef<RGBA8>)) {
    let mut gif_opts = gif::DecodeOptions::new();
    gif_opts.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = gif_opts.read_info(&mut gif_data).unwrap();
    let mut screen = gif_dispose::Screen::new_decoder(&decoder);

    while let Some(frame) = decoder.read_next_frame().unwrap() {
        screen.blit_frame(frame).unwrap();
        cb(frame, screen.pixels_rgba());
    }
}

/// Delays in centiseconds and a copy of each composited frame
fn decode_gif(path: &Path) -> (Vec<u16>, Vec<ImgVec<RGBA8>>) {
    let data = fs::read(path).unwrap();
    let mut delays = vec![];
    let mut frames = vec![];
    for_each_frame(&data, |frame, actual| {
        delays.push(frame.delay);
        frames.push(ImgVec::new(actual.pixels().collect(), actual.width(), actual.height()));
    });
    (delays, frames)
}

#[track_caller]
fn assert_images_eq(a: ImgRef<RGBA8>, b: ImgRef<RGBA8>, max_diff: f64) {
    assert_eq!((a.width(), a.height()), (b.width(), b.height()));
    let diff = a.pixels().zip(b.pixels()).map(|(a,b)| {
        let a = a.map(|c| c as i32);
        let b = b.map(|c| c as i32);
        let d = a - b;
        (d.r * d.r +
         d.g * d.g +
         d.b * d.b +
         d.a * d.a) as u64
    }).sum::<u64>() as f64 / (a.width() * a.height()) as f64;
    assert!(diff <= max_diff, "{} diff > {}", diff, max_diff);
}

#[track_caller]
fn assert_ok(res: &Value) {
    assert_eq!(res["success"], json!(true), "{}", res);
}

#[track_caller]
fn assert_code(res: &Value, code: &str) {
    assert_eq!(res["success"], json!(false), "{}", res);
    assert_eq!(res["error_code"], json!(code), "{}", res);
    assert!(res["error"].as_str().is_some_and(|e| !e.is_empty()));
}

fn p(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn frame_count() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let router = Router::default();

    let res = router.handle(&json!({"action": "get_frame_count", "input_path": p(&input)}));
    assert_ok(&res);
    assert_eq!(res["frame_count"], json!(3));
    assert_eq!(res["input_path"], json!(p(&input)));

    let res = router.handle(&json!({"action": "frame_count", "input_path": p(&dir.path().join("missing.gif"))}));
    assert_code(&res, "INPUT_NOT_FOUND");

    fs::write(dir.path().join("text.gif"), "hello").unwrap();
    let res = router.handle(&json!({"action": "get_frame_count", "input_path": p(&dir.path().join("text.gif"))}));
    assert_code(&res, "UNSUPPORTED_CONTAINER");
}

#[test]
fn reverse_twice_restores_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let once = dir.path().join("once.gif");
    let twice = dir.path().join("twice.gif");
    let router = Router::default();

    let res = router.handle(&json!({"action": "reverse_gif", "input_path": p(&input), "output_path": p(&once)}));
    assert_ok(&res);
    assert_eq!(res["frame_count"], json!(3));
    assert_eq!(res["output_path"], json!(p(&once)));

    let (delays, frames) = decode_gif(&once);
    assert_eq!(delays, [30, 20, 10]);
    assert_eq!(frames[0].buf()[0], BLUE);
    assert_eq!(frames[2].buf()[0], RED);

    assert_ok(&router.handle(&json!({"action": "reverse", "input_path": p(&once), "output_path": p(&twice)})));
    let (delays, frames) = decode_gif(&twice);
    let (orig_delays, orig_frames) = decode_gif(&input);
    assert_eq!(delays, orig_delays);
    for (a, b) in frames.iter().zip(&orig_frames) {
        assert_images_eq(a.as_ref(), b.as_ref(), 0.);
    }
}

#[test]
fn speed_changes_durations() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let router = Router::default();

    for (factor, expected) in [(json!(1.0), [10, 20, 30]), (json!(2), [5, 10, 15]), (json!("0.5"), [20, 40, 60])] {
        let out = dir.path().join("speed.gif");
        let res = router.handle(&json!({"action": "change_speed", "input_path": p(&input), "output_path": p(&out), "speed_factor": factor}));
        assert_ok(&res);
        assert_eq!(res["frame_count"], json!(3));
        assert_eq!(decode_gif(&out).0, expected, "factor {}", factor);
    }

    let out = dir.path().join("clamped.gif");
    let res = router.handle(&json!({"action": "speed", "input_path": p(&input), "output_path": p(&out), "speed_factor": 100}));
    assert_eq!(res["speed_factor"], json!(2.0));
    let res = router.handle(&json!({"action": "speed", "input_path": p(&input), "output_path": p(&out), "speed_factor": "fast"}));
    assert_eq!(res["speed_factor"], json!(1.0));
    assert_eq!(decode_gif(&out).0, [10, 20, 30]);
}

#[test]
fn compress_full_quality_keeps_solid_colors() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("solid.gif");
    let c = RGBA8::new(200, 30, 60, 255);
    write_gif_fixture(&input, &[(solid(8, 8, c), 5), (solid(8, 8, c), 5)], gif::Repeat::Finite(2));
    let out = dir.path().join("out/solid.gif");

    let res = Router::default().handle(&json!({"action": "compress", "input_path": p(&input), "output_path": p(&out), "quality": 100}));
    assert_ok(&res);
    assert_eq!(res["quality"], json!(100));
    assert_eq!(res["input_size"], json!(fs::metadata(&input).unwrap().len()));
    assert_eq!(res["output_size"], json!(fs::metadata(&out).unwrap().len()));

    let (delays, frames) = decode_gif(&out);
    assert_eq!(delays, [5, 5]);
    for f in frames {
        assert!(f.pixels().all(|px| px == c));
    }
    assert_eq!(reader::open(&out, reader::OpenMode::Any, Capabilities::detect()).unwrap().loop_count, 2);
}

#[test]
fn compress_low_quality_reduces_colors() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("colors.gif");
    write_gif_fixture(&input, &[(many_colors(), 10), (many_colors(), 10)], gif::Repeat::Infinite);
    let out = dir.path().join("colors-q1.gif");

    let res = Router::default().handle(&json!({"action": "compress_gif", "input_path": p(&input), "output_path": p(&out), "quality": 1}));
    assert_ok(&res);
    assert_eq!(res["quality"], json!(1));

    let distinct = |path: &Path| decode_gif(path).1[0].pixels().collect::<HashSet<_>>().len();
    let before = distinct(&input);
    let after = distinct(&out);
    assert!(after < before, "{} >= {}", after, before);
    assert!(after <= 16);
}

#[test]
fn resize_keeps_aspect() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let out = dir.path().join("small.gif");
    let router = Router::default();

    for (req, expected) in [(json!({"width": 10}), (10, 5)), (json!({"width": 16, "height": 16}), (16, 8)), (json!({"width": 8, "height": 3, "maintain_aspect": false}), (8, 3))] {
        let mut req = req;
        req["action"] = json!("resize");
        req["input_path"] = json!(p(&input));
        req["output_path"] = json!(p(&out));
        let res = router.handle(&req);
        assert_ok(&res);
        assert_eq!((res["width"].as_u64().unwrap(), res["height"].as_u64().unwrap()), (expected.0 as u64, expected.1 as u64));
        assert_eq!(res["original_width"], json!(20));
        assert_eq!(res["original_height"], json!(10));
        assert_eq!(res["frame_count"], json!(3));

        let (delays, frames) = decode_gif(&out);
        assert_eq!(delays, [10, 20, 30]);
        assert_eq!((frames[0].width(), frames[0].height()), expected);
        assert_images_eq(frames[1].as_ref(), solid(expected.0, expected.1, GREEN).as_ref(), 2.);
    }
}

#[test]
fn resize_needs_a_size() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let out = dir.path().join("nosize.gif");
    let res = Router::default().handle(&json!({"action": "resize", "input_path": p(&input), "output_path": p(&out), "width": 0}));
    assert_code(&res, "INVALID_SIZE");
    assert!(!out.exists());
}

#[test]
fn budget_rejects_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let out = dir.path().join("big.gif");
    let router = Router::new(Settings { max_frame_pixels: 3 * 20 * 10 - 1, ..Settings::default() });

    assert_code(&router.handle(&json!({"action": "compress", "input_path": p(&input), "output_path": p(&out)})), "MEMORY_LIMIT");
    assert!(!out.exists());

    // source fits, target doesn't
    let router = Router::new(Settings { max_frame_pixels: 3 * 20 * 10, ..Settings::default() });
    assert_code(&router.handle(&json!({"action": "resize", "input_path": p(&input), "output_path": p(&out), "width": 40})), "MEMORY_LIMIT");
    assert!(!out.exists());
    assert_ok(&router.handle(&json!({"action": "resize", "input_path": p(&input), "output_path": p(&out), "width": 10})));
}

#[test]
fn export_frames() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let out_dir = dir.path().join("frames");
    let router = Router::default();

    let res = router.handle(&json!({"action": "split", "input_path": p(&input), "output_dir": p(&out_dir), "frame_range": "all"}));
    assert_ok(&res);
    assert_eq!(res["frame_count"], json!(3));
    assert_eq!(res["export_count"], json!(3));
    assert_eq!(res["output_dir"], json!(p(&out_dir)));
    let names: Vec<_> = res["frame_paths"].as_array().unwrap().iter()
        .map(|v| Path::new(v.as_str().unwrap()).file_name().unwrap().to_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["anim_frame_0000.png", "anim_frame_0001.png", "anim_frame_0002.png"]);
    assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 3);

    let green = lodepng::decode32_file(out_dir.join("anim_frame_0001.png")).unwrap();
    assert_eq!((green.width, green.height), (20, 10));
    assert!(green.buffer.iter().all(|&px| px == GREEN));

    let bmp_dir = dir.path().join("bmp");
    let res = router.handle(&json!({"input_path": p(&input), "output_dir": p(&bmp_dir), "format": "bmp", "start_frame": 1, "end_frame": 2}));
    assert_ok(&res);
    assert_eq!(res["export_count"], json!(2));
    assert!(bmp_dir.join("anim_frame_0001.bmp").exists());
    assert!(bmp_dir.join("anim_frame_0002.bmp").exists());

    let res = router.handle(&json!({"action": "export", "input_path": p(&input), "output_dir": p(&out_dir), "frame_range": "0:2"}));
    assert_eq!(res["export_count"], json!(2));

    assert_code(&router.handle(&json!({"action": "export", "input_path": p(&input), "output_dir": p(&out_dir), "frame_range": "7"})), "BAD_REQUEST");
    assert_code(&router.handle(&json!({"action": "export", "input_path": p(&input), "output_dir": p(&out_dir), "output_format": "tiff"})), "UNSUPPORTED_OUTPUT_FORMAT");
    assert_code(&router.handle(&json!({"action": "export", "input_path": p(&input)})), "BAD_REQUEST");
}

#[test]
fn build_from_stills() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    lodepng::encode32_file(&a, solid(4, 4, RED).buf(), 4, 4).unwrap();
    lodepng::encode32_file(&b, solid(4, 4, BLUE).buf(), 4, 4).unwrap();
    let out = dir.path().join("built.gif");
    let router = Router::default();

    let res = router.handle(&json!({"action": "make_gif", "input_paths": [p(&a), "", p(&b)], "output_path": p(&out), "fps": 5}));
    assert_ok(&res);
    assert_eq!(res["frame_count"], json!(2));
    assert_eq!(res["fps"], json!(5.0));
    let (delays, frames) = decode_gif(&out);
    assert_eq!(delays, [20, 20]);
    assert_eq!(frames[0].buf()[0], RED);
    assert_eq!(frames[1].buf()[0], BLUE);

    assert_code(&router.handle(&json!({"action": "build", "input_paths": [], "output_path": p(&out)})), "BAD_REQUEST");
    assert_code(&router.handle(&json!({"action": "build", "input_paths": [p(&dir.path().join("nope.png"))], "output_path": p(&out)})), "INPUT_NOT_FOUND");
}

#[test]
fn stills_of_different_sizes_are_padded() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("wide.png");
    let b = dir.path().join("tall.bmp");
    lodepng::encode32_file(&a, solid(6, 2, RED).buf(), 6, 2).unwrap();
    image::save_buffer(&b, &[0, 255, 0, 255].repeat(2 * 5), 2, 5, image::ExtendedColorType::Rgba8).unwrap();
    let out = dir.path().join("padded.gif");

    let res = Router::default().handle(&json!({"action": "compose", "input_path": p(&a), "output_path": p(&out)}));
    assert_ok(&res);
    assert_eq!(res["fps"], json!(10.0));

    let res = Router::default().handle(&json!({"action": "compose", "input_paths": [p(&a), p(&b)], "output_path": p(&out)}));
    assert_ok(&res);
    let (delays, frames) = decode_gif(&out);
    assert_eq!(delays, [10, 10]);
    assert_eq!((frames[1].width(), frames[1].height()), (6, 5));
    assert_eq!(frames[1][(1usize, 4usize)], GREEN);
    assert_eq!(frames[1][(5usize, 4usize)].a, 0);
}

#[test]
fn alpha_threshold_after_quantization() {
    let dir = tempfile::tempdir().unwrap();
    let still = dir.path().join("alpha.png");
    let px: Vec<_> = (0..20 * 10).map(|i| {
        let x = i % 20;
        if x < 10 { RGBA8::new(10, 20, 30, if x % 2 == 0 { 100 } else { 127 }) } else { RGBA8::new(10, 20, 30, 200) }
    }).collect();
    lodepng::encode32_file(&still, &px, 20, 10).unwrap();
    let built = dir.path().join("alpha.gif");
    let router = Router::default();
    assert_ok(&router.handle(&json!({"action": "build_gif", "input_paths": [p(&still), p(&still)], "output_path": p(&built)})));

    let (_, frames) = decode_gif(&built);
    for f in &frames {
        for (src, out) in px.iter().zip(f.pixels()) {
            if src.a <= 127 {
                assert_eq!(out.a, 0);
            } else {
                assert_eq!(out, RGBA8::new(10, 20, 30, 255));
            }
        }
    }

    let compressed = dir.path().join("alpha-q.gif");
    assert_ok(&router.handle(&json!({"action": "compress", "input_path": p(&built), "output_path": p(&compressed), "quality": 40})));
    let (_, frames) = decode_gif(&compressed);
    assert!(frames[0].pixels().zip(&px).all(|(out, src)| (src.a <= 127) == (out.a == 0)));

    let resized = dir.path().join("alpha-small.gif");
    assert_ok(&router.handle(&json!({"action": "resize", "input_path": p(&built), "output_path": p(&resized), "width": 10})));
    let (_, frames) = decode_gif(&resized);
    for f in &frames {
        assert!(f.pixels().all(|px| px.a == 0 || px.a == 255));
        assert_eq!(f[(0usize, 2usize)].a, 0);
        assert_eq!(f[(9usize, 2usize)].a, 255);
    }
}

#[test]
fn unknown_action() {
    let res = Router::default().handle(&json!({"action": "explode", "input_path": "x.gif"}));
    assert_code(&res, "UNSUPPORTED_ACTION");
    let res: Value = serde_json::from_str(&Router::default().handle_json(r#"{"action": "frobnicate"}"#)).unwrap();
    assert_code(&res, "UNSUPPORTED_ACTION");
}

#[test]
fn convert_to_apng_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let apng = dir.path().join("anim.apng");
    let router = Router::default();

    let res = router.handle(&json!({"action": "convert", "input_path": p(&input), "output_path": p(&apng), "output_format": "PNG", "loop": 3}));
    assert_ok(&res);
    assert_eq!(res["output_format"], json!("apng"));
    assert_eq!(res["source_format"], json!("gif"));
    assert_eq!(res["frame_count"], json!(3));

    let decoded = reader::open(&apng, reader::OpenMode::Animated, Capabilities::detect()).unwrap();
    assert_eq!(decoded.format, ContainerFormat::Apng);
    assert_eq!(decoded.durations(), [100, 200, 300]);
    assert_eq!(decoded.loop_count, 3);
    assert_eq!(decoded.frames()[2].pixels.buf()[0], BLUE);

    let res = router.handle(&json!({"action": "get_frame_count", "input_path": p(&apng)}));
    assert_eq!(res["frame_count"], json!(3));

    let back = dir.path().join("back.gif");
    let res = router.handle(&json!({"action": "convert_animation", "input_path": p(&apng), "output_path": p(&back), "output_format": "gif"}));
    assert_ok(&res);
    assert_eq!(res["source_format"], json!("apng"));
    let (delays, frames) = decode_gif(&back);
    assert_eq!(delays, [10, 20, 30]);
    assert_eq!(frames[1].buf()[0], GREEN);

    assert_code(&router.handle(&json!({"action": "convert", "input_path": p(&input), "output_path": p(&back), "output_format": "mp4"})), "CONVERT_BAD_FORMAT");
}

#[test]
fn apng_timing_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("timed.png");
    write_apng_fixture(&input, &[solid(3, 3, RED), solid(3, 3, GREEN)], 37);
    let decoded = reader::open(&input, reader::OpenMode::Any, Capabilities::detect()).unwrap();
    assert_eq!(decoded.durations(), [37, 37]);

    let out = dir.path().join("timed-fast.png");
    assert_ok(&Router::default().handle(&json!({"action": "change_speed", "input_path": p(&input), "output_path": p(&out), "speed_factor": 2})));
    let decoded = reader::open(&out, reader::OpenMode::Any, Capabilities::detect()).unwrap();
    assert_eq!(decoded.format, ContainerFormat::Apng);
    assert_eq!(decoded.durations(), [18, 18]);
}

#[test]
fn single_frame_convert_is_not_animated() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("one.gif");
    write_gif_fixture(&input, &[(solid(2, 2, RED), 10)], gif::Repeat::Infinite);
    let res = Router::default().handle(&json!({"action": "convert", "input_path": p(&input), "output_path": p(&dir.path().join("one.png")), "output_format": "apng"}));
    assert_code(&res, "NOT_ANIMATED");
}

#[cfg(feature = "webp")]
#[test]
fn convert_to_webp_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("colors.gif");
    write_gif_fixture(&input, &[(many_colors(), 7), (solid(16, 16, GREEN), 25)], gif::Repeat::Finite(4));
    let webp = dir.path().join("colors.webp");
    let router = Router::default();

    let res = router.handle(&json!({"action": "convert", "input_path": p(&input), "output_path": p(&webp), "output_format": "webp", "quality": 10}));
    assert_ok(&res);
    assert_eq!(res["output_format"], json!("webp"));

    let source = reader::open(&input, reader::OpenMode::Any, Capabilities::detect()).unwrap();
    let decoded = reader::open(&webp, reader::OpenMode::Animated, Capabilities::detect()).unwrap();
    assert_eq!(decoded.format, ContainerFormat::Webp);
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded.durations(), [70, 250]);
    assert_eq!(decoded.loop_count, 4);
    for (a, b) in decoded.frames().iter().zip(source.frames()) {
        assert_images_eq(a.pixels.as_ref(), b.pixels.as_ref(), 0.);
    }

    let reversed = dir.path().join("reversed.webp");
    assert_ok(&router.handle(&json!({"action": "reverse", "input_path": p(&webp), "output_path": p(&reversed)})));
    let decoded = reader::open(&reversed, reader::OpenMode::Any, Capabilities::detect()).unwrap();
    assert_eq!(decoded.durations(), [250, 70]);
}

#[test]
fn disabled_output_format() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let out = dir.path().join("out.webp");
    let router = Router::new(Settings {
        capabilities: Capabilities { webp: false, ..Capabilities::detect() },
        ..Settings::default()
    });
    let res = router.handle(&json!({"action": "convert", "input_path": p(&input), "output_path": p(&out), "output_format": "webp"}));
    assert_code(&res, "UNSUPPORTED_OUTPUT_FORMAT");
    assert!(!out.exists());
}

#[test]
fn failed_encode_keeps_source() {
    let dir = tempfile::tempdir().unwrap();
    // too wide for a GIF screen
    let input = dir.path().join("wide.png");
    write_apng_fixture(&input, &[solid(70_000, 1, RED), solid(70_000, 1, BLUE)], 100);
    let before = fs::read(&input).unwrap();

    let res = Router::default().handle(&json!({"action": "convert", "input_path": p(&input), "output_path": p(&input), "output_format": "gif"}));
    assert_code(&res, "ENCODE_FAILURE");
    assert_eq!(fs::read(&input).unwrap(), before);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn overwriting_the_source_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let res = Router::default().handle(&json!({"action": "reverse", "input_path": p(&input), "output_path": p(&input), "loop": 1}));
    assert_ok(&res);
    let (delays, _) = decode_gif(&input);
    assert_eq!(delays, [30, 20, 10]);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[cfg(unix)]
#[test]
fn outputs_keep_normal_permissions() {
    use std::os::unix::fs::PermissionsExt;
    let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;

    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let plain = dir.path().join("plain");
    fs::write(&plain, "x").unwrap();
    let router = Router::default();

    let out = dir.path().join("reversed.gif");
    assert_ok(&router.handle(&json!({"action": "reverse", "input_path": p(&input), "output_path": p(&out)})));
    assert_eq!(mode(&out), mode(&plain) & 0o644);

    fs::set_permissions(&input, fs::Permissions::from_mode(0o640)).unwrap();
    assert_ok(&router.handle(&json!({"action": "reverse", "input_path": p(&input), "output_path": p(&input)})));
    assert_eq!(mode(&input), 0o640);
}

#[test]
fn failed_export_removes_its_frames() {
    let dir = tempfile::tempdir().unwrap();
    let input = rgb_fixture(dir.path());
    let out_dir = dir.path().join("frames");
    fs::create_dir_all(out_dir.join("anim_frame_0002.png")).unwrap();

    let res = Router::default().handle(&json!({"action": "export_frames", "input_path": p(&input), "output_dir": p(&out_dir)}));
    assert_code(&res, "INTERNAL_ERROR");
    let left: Vec<_> = fs::read_dir(&out_dir).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(left, ["anim_frame_0002.png"]);
    assert!(out_dir.join("anim_frame_0002.png").is_dir());
}

#[cfg(feature = "webp")]
#[test]
fn webp_probe_reads_headers() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("wide.gif");
    write_gif_fixture(&input, &[(solid(12, 5, RED), 4), (solid(12, 5, GREEN), 4), (solid(12, 5, BLUE), 4)], gif::Repeat::Infinite);
    let webp = dir.path().join("wide.webp");
    let router = Router::default();
    assert_ok(&router.handle(&json!({"action": "convert", "input_path": p(&input), "output_path": p(&webp), "output_format": "webp"})));

    let caps = Capabilities::detect();
    let probe = reader::probe(&webp, caps).unwrap();
    let opened = reader::open(&webp, reader::OpenMode::Animated, caps).unwrap();
    assert_eq!(probe.format, ContainerFormat::Webp);
    assert_eq!(probe.frame_count, opened.len());
    assert_eq!((probe.width, probe.height), (opened.width(), opened.height()));
    assert_eq!((probe.width, probe.height), (12, 5));

    let res = router.handle(&json!({"action": "get_frame_count", "input_path": p(&webp)}));
    assert_eq!(res["frame_count"], json!(3));
}
