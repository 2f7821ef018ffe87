//! Browser front end served at `/`.

use crate::image_prep::MAX_DIMENSION;
use crate::poll::{MAX_ATTEMPTS, POLL_INTERVAL};
use crate::workflow::DEFAULT_PROMPT;

pub fn render() -> String {
    let default_prompt =
        serde_json::to_string(DEFAULT_PROMPT).unwrap_or_else(|_| "\"\"".to_string());
    INDEX_HTML
        .replace("__POLL_INTERVAL_MS__", &POLL_INTERVAL.as_millis().to_string())
        .replace("__MAX_ATTEMPTS__", &MAX_ATTEMPTS.to_string())
        .replace("__MAX_DIMENSION__", &MAX_DIMENSION.to_string())
        .replace("__DEFAULT_PROMPT__", &default_prompt)
}

const INDEX_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>AI Face Swap</title>
    <style>
        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            background: linear-gradient(135deg, #1f1c2c 0%, #3a3357 100%);
            min-height: 100vh;
            display: flex;
            align-items: flex-start;
            justify-content: center;
            padding: 40px 20px;
            color: #333;
        }

        .container {
            background: white;
            border-radius: 20px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.35);
            max-width: 900px;
            width: 100%;
            padding: 40px;
        }

        .header h1 {
            font-size: 2em;
            margin-bottom: 8px;
        }

        .header p {
            color: #666;
            font-size: 0.9em;
            margin-bottom: 30px;
        }

        .upload-grid {
            display: grid;
            grid-template-columns: 1fr 1fr;
            gap: 20px;
        }

        .upload-card {
            position: relative;
            border: 3px dashed #7b6cf6;
            border-radius: 15px;
            min-height: 260px;
            display: flex;
            flex-direction: column;
            align-items: center;
            justify-content: center;
            text-align: center;
            cursor: pointer;
            background: #f8f7ff;
            transition: all 0.3s;
            overflow: hidden;
        }

        .upload-card:hover {
            border-color: #5a4bd1;
            background: #f0eeff;
        }

        .upload-card.has-image {
            border-style: solid;
        }

        .upload-card input[type="file"] {
            display: none;
        }

        .upload-icon {
            font-size: 3em;
            margin-bottom: 12px;
        }

        .upload-label {
            color: #5a4bd1;
            font-weight: 600;
            font-size: 1.1em;
        }

        .upload-hint {
            color: #999;
            font-size: 0.85em;
            margin-top: 6px;
        }

        .preview-image {
            width: 100%;
            height: 100%;
            max-height: 360px;
            object-fit: contain;
        }

        .remove-btn {
            position: absolute;
            top: 10px;
            right: 10px;
            border: none;
            border-radius: 50%;
            width: 32px;
            height: 32px;
            background: rgba(0,0,0,0.6);
            color: white;
            cursor: pointer;
        }

        .prompt-section {
            margin-top: 25px;
        }

        .prompt-label {
            display: block;
            font-weight: 600;
            margin-bottom: 8px;
            text-transform: uppercase;
            letter-spacing: 1px;
            font-size: 0.8em;
            color: #5a4bd1;
        }

        .prompt-textarea {
            width: 100%;
            min-height: 120px;
            border: 2px solid #e0ddff;
            border-radius: 10px;
            padding: 12px;
            font-family: inherit;
            font-size: 0.9em;
            resize: vertical;
        }

        .generate-btn, .download-btn {
            border: none;
            border-radius: 10px;
            background: #5a4bd1;
            color: white;
            font-weight: 600;
            cursor: pointer;
        }

        .generate-btn {
            margin-top: 20px;
            width: 100%;
            padding: 16px;
            font-size: 1.1em;
        }

        .generate-btn:disabled {
            background: #bbb;
            cursor: not-allowed;
        }

        .progress-section, .error-section, .result-section {
            margin-top: 25px;
            display: none;
        }

        .progress-section {
            text-align: center;
        }

        .progress-spinner {
            border: 4px solid #f3f3f3;
            border-top: 4px solid #5a4bd1;
            border-radius: 50%;
            width: 50px;
            height: 50px;
            animation: spin 1s linear infinite;
            margin: 0 auto 15px;
        }

        @keyframes spin {
            0% { transform: rotate(0deg); }
            100% { transform: rotate(360deg); }
        }

        .progress-detail {
            color: #888;
            font-size: 0.85em;
            margin-top: 4px;
        }

        .progress-timer {
            font-size: 1.6em;
            font-weight: 600;
            margin-top: 10px;
            font-variant-numeric: tabular-nums;
        }

        .error-section {
            background: #fee;
            border: 2px solid #fcc;
            color: #c33;
            padding: 15px;
            border-radius: 10px;
        }

        .result-header {
            display: flex;
            justify-content: space-between;
            align-items: center;
            margin-bottom: 15px;
        }

        .result-title {
            font-weight: 600;
            font-size: 1.2em;
        }

        .download-btn {
            padding: 10px 18px;
            text-decoration: none;
        }

        .result-image {
            max-width: 100%;
            border-radius: 10px;
            box-shadow: 0 4px 15px rgba(0,0,0,0.15);
        }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>✨ AI Face Swap</h1>
            <p>ComfyUI face swap with Z-Image Turbo refinement on RunPod</p>
        </div>

        <div class="upload-grid">
            <div class="upload-card" id="sourceCard" data-kind="source">
                <input type="file" id="sourceInput" accept="image/*">
                <div class="upload-icon">🧑</div>
                <div class="upload-label">Source Face</div>
                <div class="upload-hint">The face to take</div>
            </div>
            <div class="upload-card" id="targetCard" data-kind="target">
                <input type="file" id="targetInput" accept="image/*">
                <div class="upload-icon">🖼️</div>
                <div class="upload-label">Target Image</div>
                <div class="upload-hint">The picture to put it in</div>
            </div>
        </div>

        <div class="prompt-section">
            <label class="prompt-label" for="prompt">Prompt</label>
            <textarea class="prompt-textarea" id="prompt" placeholder="Describe the face swap..."></textarea>
        </div>

        <button class="generate-btn" id="generateBtn" disabled>🚀 Generate</button>

        <div class="progress-section" id="progress">
            <div class="progress-spinner"></div>
            <div id="progressStatus">Submitting to RunPod...</div>
            <div class="progress-detail" id="progressDetail"></div>
            <div class="progress-timer" id="timer">0:00</div>
        </div>

        <div class="error-section" id="error"></div>

        <div class="result-section" id="result">
            <div class="result-header">
                <div class="result-title">✅ Done</div>
                <a class="download-btn" id="downloadLink">⬇ Download</a>
            </div>
            <img id="resultImage" class="result-image" alt="Result">
        </div>
    </div>

    <script>
        const POLL_INTERVAL_MS = __POLL_INTERVAL_MS__;
        const MAX_ATTEMPTS = __MAX_ATTEMPTS__;
        const MAX_DIMENSION = __MAX_DIMENSION__;
        const DEFAULT_PROMPT = __DEFAULT_PROMPT__;

        const images = { source: null, target: null };
        const cards = {
            source: document.getElementById('sourceCard'),
            target: document.getElementById('targetCard'),
        };
        const inputs = {
            source: document.getElementById('sourceInput'),
            target: document.getElementById('targetInput'),
        };
        const promptInput = document.getElementById('prompt');
        const generateBtn = document.getElementById('generateBtn');
        const progress = document.getElementById('progress');
        const progressStatus = document.getElementById('progressStatus');
        const progressDetail = document.getElementById('progressDetail');
        const timerEl = document.getElementById('timer');
        const errorDiv = document.getElementById('error');
        const result = document.getElementById('result');
        const resultImage = document.getElementById('resultImage');
        const downloadLink = document.getElementById('downloadLink');

        const cardTemplates = {
            source: cards.source.innerHTML,
            target: cards.target.innerHTML,
        };

        let busy = false;
        let activeJob = null;
        let timer = null;

        promptInput.value = DEFAULT_PROMPT;

        function refreshButton() {
            generateBtn.disabled = busy || !images.source || !images.target;
            generateBtn.textContent = busy ? '⏳ Processing...' : '🚀 Generate';
        }

        function bindCard(kind) {
            cards[kind].addEventListener('click', () => {
                if (!busy) inputs[kind].click();
            });
            inputs[kind].addEventListener('change', (e) => {
                const file = e.target.files[0];
                if (file) selectImage(file, kind);
            });
        }

        function resetCard(kind) {
            images[kind] = null;
            cards[kind].classList.remove('has-image');
            cards[kind].innerHTML = cardTemplates[kind];
            inputs[kind] = cards[kind].querySelector('input');
            inputs[kind].addEventListener('change', (e) => {
                const file = e.target.files[0];
                if (file) selectImage(file, kind);
            });
            refreshButton();
        }

        // Proxies and body-limit rejections may answer with plain text.
        async function readJson(res) {
            try {
                return await res.json();
            } catch (_) {
                return { error: res.status === 413 ? 'Image is too large' : `HTTP ${res.status}` };
            }
        }

        async function selectImage(file, kind) {
            hideError();
            const formData = new FormData();
            formData.append('image', file);

            try {
                const res = await fetch('/prepare', { method: 'POST', body: formData });
                const data = await readJson(res);
                if (!res.ok) throw new Error(data.error || 'Could not read image');

                images[kind] = data.image;
                cards[kind].classList.add('has-image');
                cards[kind].innerHTML = '';
                cards[kind].appendChild(inputs[kind]);

                const preview = document.createElement('img');
                preview.className = 'preview-image';
                preview.src = URL.createObjectURL(file);
                preview.title = `${data.width}×${data.height} (max ${MAX_DIMENSION}px)`;
                cards[kind].appendChild(preview);

                const remove = document.createElement('button');
                remove.className = 'remove-btn';
                remove.textContent = '✕';
                remove.addEventListener('click', (e) => {
                    e.stopPropagation();
                    if (!busy) resetCard(kind);
                });
                cards[kind].appendChild(remove);
            } catch (err) {
                showError(`Upload error: ${err.message}`);
            }
            refreshButton();
        }

        function formatTime(seconds) {
            const m = Math.floor(seconds / 60);
            const s = seconds % 60;
            return `${m}:${s.toString().padStart(2, '0')}`;
        }

        function startTimer() {
            let elapsed = 0;
            timerEl.textContent = formatTime(0);
            timer = setInterval(() => {
                elapsed += 1;
                timerEl.textContent = formatTime(elapsed);
            }, 1000);
        }

        function stopTimer() {
            if (timer) {
                clearInterval(timer);
                timer = null;
            }
        }

        function showError(message) {
            errorDiv.textContent = '❌ ' + message;
            errorDiv.style.display = 'block';
        }

        function hideError() {
            errorDiv.style.display = 'none';
        }

        function finish() {
            stopTimer();
            busy = false;
            activeJob = null;
            progress.style.display = 'none';
            refreshButton();
        }

        function cancelJob(jobId) {
            navigator.sendBeacon(`/cancel/${encodeURIComponent(jobId)}`);
        }

        const sleep = (ms) => new Promise((r) => setTimeout(r, ms));

        async function pollStatus(jobId) {
            for (let attempt = 1; attempt <= MAX_ATTEMPTS; attempt++) {
                let data;
                try {
                    const res = await fetch(`/status/${encodeURIComponent(jobId)}`);
                    data = await readJson(res);
                    if (!res.ok) throw new Error(data.error || `HTTP ${res.status}`);
                } catch (err) {
                    finish();
                    showError(`Polling error: ${err.message}`);
                    return;
                }

                if (data.status === 'COMPLETED') {
                    finish();
                    if (data.resultImage) {
                        const src = `data:image/png;base64,${data.resultImage}`;
                        resultImage.src = src;
                        downloadLink.href = src;
                        downloadLink.download = `faceswap_${Date.now()}.png`;
                        result.style.display = 'block';
                    } else {
                        showError('Job completed but no image was found.');
                    }
                    return;
                }
                if (['FAILED', 'CANCELLED', 'TIMED_OUT'].includes(data.status)) {
                    finish();
                    showError(data.error || `RunPod job ended with status ${data.status}.`);
                    return;
                }

                progressStatus.textContent = data.status === 'IN_QUEUE'
                    ? 'Waiting for a GPU...'
                    : 'Processing on GPU...';

                if (attempt < MAX_ATTEMPTS) await sleep(POLL_INTERVAL_MS);
            }

            cancelJob(jobId);
            finish();
            const minutes = Math.round(MAX_ATTEMPTS * POLL_INTERVAL_MS / 60000);
            showError(`Timed out after ${minutes} minutes; the job was cancelled.`);
        }

        generateBtn.addEventListener('click', async () => {
            if (!images.source || !images.target || busy) return;

            busy = true;
            refreshButton();
            hideError();
            result.style.display = 'none';
            progress.style.display = 'block';
            progressStatus.textContent = 'Submitting to RunPod...';
            progressDetail.textContent = '';
            startTimer();

            try {
                const res = await fetch('/generate', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({
                        prompt: promptInput.value,
                        sourceImage: images.source,
                        targetImage: images.target,
                    }),
                });
                const data = await readJson(res);

                if (!res.ok) {
                    finish();
                    showError(data.error || 'Could not submit job');
                    return;
                }

                activeJob = data.jobId;
                progressStatus.textContent = 'Processing on GPU...';
                progressDetail.textContent = 'Face swap + Z-Image Turbo refinement';
                await pollStatus(data.jobId);
            } catch (err) {
                finish();
                showError(`Connection error: ${err.message}`);
            }
        });

        window.addEventListener('pagehide', () => {
            if (activeJob) cancelJob(activeJob);
        });

        bindCard('source');
        bindCard('target');
    </script>
</body>
</html>
"#;
